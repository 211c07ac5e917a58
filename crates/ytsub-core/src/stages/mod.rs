//! The five stage processors wired into the scheduler (spec §4.8): each
//! implements `StageProcessor<StageData>` and is handed to
//! `PipelineScheduler::new` via `crate::scheduler::Stages`.

pub mod detect;
pub mod download;
pub mod output;
pub mod summarize;
pub mod translate;

use ytsub_models::SrtCue;

/// Render cues back to SRT text, renumbering sequentially from 1. Used
/// wherever a stage reassembles cues it did not originally parse from an
/// SRT file (TRANSLATE's chunk-by-chunk reassembly).
pub fn render_srt(cues: &[SrtCue]) -> String {
    let mut out = String::new();
    for (i, cue) in cues.iter().enumerate() {
        out.push_str(&(i + 1).to_string());
        out.push('\n');
        out.push_str(&cue.start);
        out.push_str(" --> ");
        out.push_str(&cue.end);
        out.push('\n');
        out.push_str(&cue.text);
        out.push_str("\n\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_cues_with_sequential_numbering() {
        let cues = vec![
            SrtCue { index: 7, start: "00:00:01,000".to_string(), end: "00:00:02,000".to_string(), text: "hi".to_string() },
            SrtCue { index: 9, start: "00:00:02,000".to_string(), end: "00:00:03,000".to_string(), text: "bye".to_string() },
        ];
        let srt = render_srt(&cues);
        assert!(srt.starts_with("1\n00:00:01,000 --> 00:00:02,000\nhi\n\n2\n"));
    }
}
