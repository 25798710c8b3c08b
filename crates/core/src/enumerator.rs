//! One-shot sweep over all top-level windows.

use crate::classifier::{ClassificationOutcome, Classifier};
use crate::platform::WindowPrimitives;
use crate::program::ProgramDescriptor;
use crate::WindowHandle;
use std::ops::ControlFlow;

/// Classify every top-level window in OS order.
///
/// `visit` receives each outcome; returning `false` stops the sweep.
pub fn enumerate<P, F>(platform: &P, visit: F)
where
    P: WindowPrimitives + ?Sized,
    F: FnMut(ClassificationOutcome) -> bool,
{
    enumerate_with(platform, &Classifier::default(), visit);
}

/// [`enumerate`] with an explicit classifier.
pub fn enumerate_with<P, F>(platform: &P, classifier: &Classifier, mut visit: F)
where
    P: WindowPrimitives + ?Sized,
    F: FnMut(ClassificationOutcome) -> bool,
{
    platform.visit_top_level_windows(&mut |handle| {
        if visit(classifier.classify(platform, handle)) {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(())
        }
    });
}

/// Every outcome, in enumeration order.
pub fn collect_outcomes<P: WindowPrimitives + ?Sized>(
    platform: &P,
    classifier: &Classifier,
) -> Vec<ClassificationOutcome> {
    let mut outcomes = Vec::new();
    enumerate_with(platform, classifier, |outcome| {
        outcomes.push(outcome);
        true
    });
    outcomes
}

/// Windows a task switcher would show, with their programs.
pub fn switchable_programs<P: WindowPrimitives + ?Sized>(
    platform: &P,
    classifier: &Classifier,
) -> Vec<(WindowHandle, ProgramDescriptor)> {
    collect_outcomes(platform, classifier)
        .into_iter()
        .filter_map(|outcome| match outcome {
            ClassificationOutcome::Successful { handle, program } => Some((handle, program)),
            _ => None,
        })
        .collect()
}
