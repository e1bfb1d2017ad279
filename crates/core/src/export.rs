use crate::types::Frame;

/// Format seconds as M:SS timestamp
pub fn format_timestamp(seconds: f64) -> String {
    let mins = (seconds / 60.0) as u32;
    let secs = (seconds % 60.0) as u32;
    format!("{}:{:02}", mins, secs)
}

/// Markdown listing of every described frame. `None` when nothing is described.
pub fn export_markdown(frames: &[Frame]) -> Option<String> {
    let analyzed: Vec<_> = frames
        .iter()
        .filter_map(|frame| frame.description().map(|d| (frame.timestamp, d)))
        .collect();
    if analyzed.is_empty() {
        return None;
    }

    let mut output = String::new();
    output.push_str("# FrameSpeak Frames\n\n");
    output.push_str(&format!("Total: {}\n", frames.len()));
    output.push_str(&format!("Analyzed: {}\n\n", analyzed.len()));
    output.push_str("---\n\n");

    for (index, (timestamp, description)) in analyzed.into_iter().enumerate() {
        output.push_str(&format!(
            "## Frame {} (Time: {})\n\n",
            index + 1,
            format_timestamp(timestamp)
        ));
        output.push_str(&format!("**English:**\n{}\n\n", description.en));
        output.push_str(&format!("**中文:**\n{}\n\n", description.zh));
        output.push_str("---\n\n");
    }

    Some(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FrameDescription;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "0:00");
        assert_eq!(format_timestamp(65.9), "1:05");
        assert_eq!(format_timestamp(600.0), "10:00");
    }

    #[test]
    fn test_export_skips_undescribed_frames() {
        let mut frames = vec![
            Frame::new(0.0, vec![1], None),
            Frame::new(5.0, vec![2], None),
            Frame::new(70.0, vec![3], None),
        ];
        frames[2].set_description(FrameDescription {
            en: "a harbor at night".into(),
            zh: "夜晚的港口".into(),
        });

        let text = export_markdown(&frames).unwrap();
        assert!(text.starts_with("# FrameSpeak Frames\n\nTotal: 3\nAnalyzed: 1\n\n---\n\n"));
        assert!(text.contains("## Frame 1 (Time: 1:10)\n\n"));
        assert!(text.contains("**English:**\na harbor at night\n\n"));
        assert!(text.contains("**中文:**\n夜晚的港口\n\n---\n\n"));
    }

    #[test]
    fn test_export_without_descriptions() {
        let frames = vec![Frame::new(0.0, vec![1], None)];
        assert!(export_markdown(&frames).is_none());
        assert!(export_markdown(&[]).is_none());
    }
}
