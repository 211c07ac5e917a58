//! Subtitle format detection and conversion to SRT.
//!
//! Converts the caption formats YouTube serves (WebVTT, the `json3` event
//! stream, and the `srv3` timedtext XML dialect) to plain SRT text. Pure
//! functions only: no I/O, no network. Consumed internally by the DOWNLOAD
//! stage processor, which owns reading the source bytes and writing the
//! resulting SRT to disk.

/// Caption source format, as distinguished by `detect_format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleSourceFormat {
    Vtt,
    Json3,
    Srv3,
    Srt,
}

/// Convert milliseconds to an SRT timestamp (`HH:MM:SS,mmm`).
pub fn ms_to_srt_time(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1_000;
    let millis = ms % 1_000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
}

/// Convert WebVTT to SRT. Drops the `WEBVTT` header, `NOTE` lines, and
/// cue-settings (`align:`/`position:`/`line:`/`size:`); rewrites the
/// millisecond separator from `.` to `,`.
pub fn convert_vtt_to_srt(vtt_content: &str) -> String {
    let mut lines: Vec<&str> = vtt_content.trim().split('\n').collect();
    if lines.first().map(|l| l.starts_with("WEBVTT")).unwrap_or(false) {
        lines.remove(0);
    }

    let mut out = Vec::new();
    let mut counter = 1u32;
    let mut i = 0usize;
    while i < lines.len() {
        let line = lines[i].trim();
        if line.is_empty() || line.starts_with("NOTE") {
            i += 1;
            continue;
        }
        if line.contains(" --> ") {
            out.push(counter.to_string());
            out.push(strip_vtt_cue_settings(&vtt_timestamp_to_srt(line)));
            counter += 1;
            i += 1;
            while i < lines.len() && !lines[i].trim().is_empty() {
                out.push(lines[i].trim().to_string());
                i += 1;
            }
            out.push(String::new());
        } else {
            i += 1;
        }
    }
    out.join("\n")
}

fn vtt_timestamp_to_srt(line: &str) -> String {
    // VTT uses `.` before milliseconds; SRT uses `,`. Only the two
    // timestamps (each `HH:MM:SS.mmm`) need rewriting.
    let mut result = String::with_capacity(line.len());
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if is_timestamp_at(line, i) {
            result.push_str(&line[i..i + 8]);
            result.push(',');
            result.push_str(&line[i + 9..i + 12]);
            i += 12;
        } else {
            result.push(bytes[i] as char);
            i += 1;
        }
    }
    result
}

fn is_timestamp_at(line: &str, i: usize) -> bool {
    let b = line.as_bytes();
    if i + 12 > b.len() {
        return false;
    }
    let digits_at = |pos: usize| (pos < b.len()) && b[pos].is_ascii_digit();
    digits_at(i) && digits_at(i + 1)
        && b[i + 2] == b':'
        && digits_at(i + 3) && digits_at(i + 4)
        && b[i + 5] == b':'
        && digits_at(i + 6) && digits_at(i + 7)
        && b[i + 8] == b'.'
        && digits_at(i + 9) && digits_at(i + 10) && digits_at(i + 11)
}

fn strip_vtt_cue_settings(timestamp_line: &str) -> String {
    // Remove trailing ` key:value` cue settings (align/position/line/size).
    let mut parts: Vec<&str> = timestamp_line.split(' ').collect();
    parts.retain(|p| {
        !["align:", "position:", "line:", "size:"]
            .iter()
            .any(|prefix| p.starts_with(prefix))
    });
    parts.join(" ")
}

/// Convert YouTube's `json3` event-stream caption format to SRT. Falls
/// back to returning the input unchanged if it does not parse as JSON,
/// matching the "never hard-fail a format conversion" behavior of the
/// other converters.
pub fn convert_json3_to_srt(json_content: &str) -> String {
    let data: serde_json::Value = match serde_json::from_str(json_content) {
        Ok(v) => v,
        Err(_) => return json_content.to_string(),
    };
    let events = match data.get("events").and_then(|e| e.as_array()) {
        Some(events) => events,
        None => return json_content.to_string(),
    };

    let mut out = Vec::new();
    let mut counter = 1u32;
    for event in events {
        let segs = match event.get("segs").and_then(|s| s.as_array()) {
            Some(segs) => segs,
            None => continue,
        };
        let start_ms = event.get("tStartMs").and_then(|v| v.as_u64()).unwrap_or(0);
        let duration_ms = event.get("dDurationMs").and_then(|v| v.as_u64()).unwrap_or(0);
        let end_ms = start_ms + duration_ms;

        let text: String = segs
            .iter()
            .filter_map(|seg| seg.get("utf8").and_then(|v| v.as_str()))
            .collect::<Vec<_>>()
            .join("");
        let text = text.trim();
        if !text.is_empty() {
            out.push(counter.to_string());
            out.push(format!("{} --> {}", ms_to_srt_time(start_ms), ms_to_srt_time(end_ms)));
            out.push(text.to_string());
            out.push(String::new());
            counter += 1;
        }
    }
    out.join("\n")
}

/// Convert YouTube's `srv3` timedtext XML dialect to SRT by scanning for
/// `<p ... t="start" ... d="duration" ...>text</p>` elements.
pub fn convert_srv3_to_srt(srv3_content: &str) -> String {
    let mut out = Vec::new();
    let mut counter = 1u32;

    for (start_ms, duration_ms, text) in find_srv3_paragraphs(srv3_content) {
        let end_ms = start_ms + duration_ms;
        let text = unescape_html(text.trim());
        if !text.is_empty() {
            out.push(counter.to_string());
            out.push(format!("{} --> {}", ms_to_srt_time(start_ms), ms_to_srt_time(end_ms)));
            out.push(text);
            out.push(String::new());
            counter += 1;
        }
    }

    if out.is_empty() {
        srv3_content.to_string()
    } else {
        out.join("\n")
    }
}

/// Scan for `<p ... t="N" ... d="N" ...>TEXT</p>` elements, tolerant of
/// attribute order, returning `(start_ms, duration_ms, inner_text)`.
fn find_srv3_paragraphs(content: &str) -> Vec<(u64, u64, &str)> {
    let mut results = Vec::new();
    let mut rest = content;
    while let Some(open) = rest.find("<p") {
        let after_open = &rest[open..];
        let Some(tag_end) = after_open.find('>') else { break };
        let tag = &after_open[..tag_end];
        let Some(close_rel) = after_open[tag_end + 1..].find("</p>") else {
            rest = &after_open[tag_end + 1..];
            continue;
        };
        let text = &after_open[tag_end + 1..tag_end + 1 + close_rel];

        if let (Some(t), Some(d)) = (attr_value(tag, "t"), attr_value(tag, "d")) {
            if let (Ok(t_ms), Ok(d_ms)) = (t.parse::<u64>(), d.parse::<u64>()) {
                results.push((t_ms, d_ms, text));
            }
        }

        rest = &after_open[tag_end + 1 + close_rel + 4..];
    }
    results
}

fn attr_value<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let marker = format!("{}=\"", name);
    let pos = tag.find(&marker)?;
    let start = pos + marker.len();
    let end = tag[start..].find('"')? + start;
    Some(&tag[start..end])
}

fn unescape_html(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

/// Detect the source format of caption bytes.
pub fn detect_format(content: &str) -> Option<SubtitleSourceFormat> {
    let content = content.trim();

    if content.starts_with("WEBVTT") {
        return Some(SubtitleSourceFormat::Vtt);
    }

    if content.starts_with('{') {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(content) {
            if value.get("events").is_some() {
                return Some(SubtitleSourceFormat::Json3);
            }
        }
    }

    if content.starts_with("<?xml") || content.contains("<transcript>") || content.contains("<p t=") {
        return Some(SubtitleSourceFormat::Srv3);
    }

    let mut lines = content.split('\n');
    if let (Some(first), Some(second)) = (lines.next(), lines.next()) {
        if first.trim().chars().all(|c| c.is_ascii_digit()) && !first.trim().is_empty() && second.contains(" --> ") {
            return Some(SubtitleSourceFormat::Srt);
        }
    }

    None
}

/// Detect the format (unless `source_format` is given) and convert to SRT.
/// `srt → srt` is identity; unrecognized formats pass through unchanged.
pub fn convert_to_srt(content: &str, source_format: Option<SubtitleSourceFormat>) -> String {
    let format = source_format.or_else(|| detect_format(content));
    match format {
        Some(SubtitleSourceFormat::Vtt) => convert_vtt_to_srt(content),
        Some(SubtitleSourceFormat::Json3) => convert_json3_to_srt(content),
        Some(SubtitleSourceFormat::Srv3) => convert_srv3_to_srt(content),
        Some(SubtitleSourceFormat::Srt) | None => content.to_string(),
    }
}
