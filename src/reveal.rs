//! Progressive display of a response that is already complete.

use futures::Stream;
use std::time::Duration;

pub const CURSOR: char = '▌';

/// Cumulative frames of `text`, `chars_per_frame` characters at a time, each
/// with a trailing cursor, followed by the full text without it.
pub fn frames(text: &str, chars_per_frame: usize) -> Vec<String> {
    let step = chars_per_frame.max(1);
    let chars: Vec<char> = text.chars().collect();
    let mut frames = Vec::with_capacity(chars.len() / step + 2);

    let mut shown = String::with_capacity(text.len() + CURSOR.len_utf8());
    for chunk in chars.chunks(step) {
        shown.extend(chunk);
        frames.push(format!("{shown}{CURSOR}"));
    }
    frames.push(text.to_string());
    frames
}

/// Emits `frames` with `delay` between consecutive frames.
pub fn timed(frames: Vec<String>, delay: Duration) -> impl Stream<Item = String> {
    futures::stream::unfold(
        (frames.into_iter(), true),
        move |(mut rest, first)| async move {
            let frame = rest.next()?;
            if !first && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Some((frame, (rest, false)))
        },
    )
}
