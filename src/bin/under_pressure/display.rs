//! Plain-text rendering for calibration progress and live signals.

use under_pressure::biometrics::{BiometricSignals, CalibrationState, Reaction};
use under_pressure::session::BiometricHistory;

const BAR_FULL: char = '█';
const BAR_EMPTY: char = '░';
const ACTIVE_MARKER: char = '!';

pub(crate) const SIGNAL_BAR_WIDTH: usize = 10;
pub(crate) const PROGRESS_BAR_WIDTH: usize = 24;

/// Horizontal bar for a value in `[0, 1]`.
#[must_use]
pub(crate) fn format_bar(value: f32, width: usize) -> String {
    let filled = ((value.clamp(0.0, 1.0) * width as f32).round() as usize).min(width);
    let mut bar = String::with_capacity(width * 3);
    bar.extend(std::iter::repeat(BAR_FULL).take(filled));
    bar.extend(std::iter::repeat(BAR_EMPTY).take(width - filled));
    bar
}

#[must_use]
pub(crate) fn format_calibration_line(state: &CalibrationState) -> String {
    format!(
        "{} {:>3.0}%  {}",
        format_bar(state.progress, PROGRESS_BAR_WIDTH),
        state.progress * 100.0,
        state.status_message
    )
}

/// One line per reading; active reactions are flagged.
#[must_use]
pub(crate) fn format_signals_line(signals: &BiometricSignals) -> String {
    let active = signals.active_reactions();
    Reaction::ALL
        .iter()
        .map(|reaction| {
            let score = signals.score(*reaction);
            let marker = if active.contains(reaction) {
                ACTIVE_MARKER
            } else {
                ' '
            };
            format!(
                "{:<10} {} {score:.2}{marker}",
                reaction.label(),
                format_bar(score, SIGNAL_BAR_WIDTH)
            )
        })
        .collect::<Vec<_>>()
        .join("  ")
}

#[must_use]
pub(crate) fn format_session_summary(history: &BiometricHistory) -> String {
    format!("Biometric summary\n{}", history.summary())
}
