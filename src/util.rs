use crate::constants::{BYTES_PER_MB, PARTIAL_MARKERS};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::SystemTime;

const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*', '%'];

// 将单集名称转换为安全的文件名主干
// '%' 也会被替换，否则会被 yt-dlp 当作输出模板的一部分
pub fn sanitize_filename(name: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_whitespace = false;

    for c in name.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                out.push('_');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;
        if ILLEGAL_CHARS.contains(&c) || c.is_control() {
            out.push('_');
        } else {
            out.push(c);
        }
    }

    let trimmed = out.trim_start_matches('.');
    let capped: String = trimmed.chars().take(max_chars).collect();

    if capped.is_empty() {
        "episode".to_string()
    } else {
        capped
    }
}

// 主干之后的部分以 '.' 开头才属于该主干，"Mix" 不匹配 "Mix_Part_2.m4a"
pub fn stem_suffix<'a>(file_name: &'a str, stem: &str) -> Option<&'a str> {
    file_name.strip_prefix(stem).filter(|rest| rest.starts_with('.'))
}

// 只检查主干之后的部分，单集名称中的 "Frag" 或 ".temp" 不算
pub fn is_partial_artifact(suffix: &str) -> bool {
    PARTIAL_MARKERS.iter().any(|marker| suffix.contains(marker))
}

pub fn base_name(path: &Path) -> Option<String> {
    path.file_name().map(|name| name.to_string_lossy().to_string())
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB as f64
}

// 保留两位小数的MB值
pub fn mb_rounded(bytes: u64) -> f64 {
    (bytes_to_mb(bytes) * 100.0).round() / 100.0
}

pub fn to_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

pub fn age_millis(now: SystemTime, modified: SystemTime) -> u64 {
    now.duration_since(modified)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn sanitize_strips_illegal_characters() {
        let name = r#"Live <at> "Club": A/B\C|D?E*F 100%"#;
        let stem = sanitize_filename(name, 100);
        for c in ['<', '>', ':', '"', '/', '\\', '|', '?', '*', '%', ' '] {
            assert!(!stem.contains(c), "{} still contains {:?}", stem, c);
        }
        assert_eq!(stem, "Live__at___Club___A_B_C_D_E_F_100_");
    }

    #[test]
    fn sanitize_collapses_whitespace() {
        assert_eq!(sanitize_filename("a   b\t\nc", 100), "a_b_c");
    }

    #[test]
    fn sanitize_caps_length_on_char_boundary() {
        let name = "é".repeat(300);
        let stem = sanitize_filename(&name, 200);
        assert_eq!(stem.chars().count(), 200);

        let stem = sanitize_filename(&"x".repeat(150), 100);
        assert_eq!(stem.len(), 100);
    }

    #[test]
    fn sanitize_never_returns_empty_or_hidden() {
        assert_eq!(sanitize_filename("", 100), "episode");
        assert_eq!(sanitize_filename("...", 100), "episode");
        assert_eq!(sanitize_filename("..hidden", 100), "hidden");
    }

    #[test]
    fn partial_markers() {
        assert!(is_partial_artifact(".m4a.part"));
        assert!(is_partial_artifact(".m4a.part-Frag12"));
        assert!(is_partial_artifact(".m4a.ytdl"));
        assert!(is_partial_artifact(".temp.m4a"));
        assert!(!is_partial_artifact(".m4a"));
    }

    #[test]
    fn suffix_requires_dot_after_stem() {
        assert_eq!(stem_suffix("Mix.m4a", "Mix"), Some(".m4a"));
        assert_eq!(stem_suffix("Mix.m4a.part", "Mix"), Some(".m4a.part"));
        assert_eq!(stem_suffix("Mix_Part_2.m4a", "Mix"), None);
        assert_eq!(stem_suffix("Other.m4a", "Mix"), None);
    }

    #[test]
    fn marker_words_inside_the_stem_are_not_partial() {
        let suffix = stem_suffix("Fragile_Sunday_Mix.m4a", "Fragile_Sunday_Mix").unwrap();
        assert!(!is_partial_artifact(suffix));
        let suffix = stem_suffix("live.temple.m4a", "live.temple").unwrap();
        assert!(!is_partial_artifact(suffix));
        let suffix = stem_suffix("live.temple.m4a.part", "live.temple").unwrap();
        assert!(is_partial_artifact(suffix));
    }

    #[test]
    fn megabyte_rounding() {
        assert_eq!(mb_rounded(BYTES_PER_MB), 1.0);
        assert_eq!(mb_rounded(BYTES_PER_MB / 2 + BYTES_PER_MB), 1.5);
        assert_eq!(mb_rounded(0), 0.0);
    }

    #[test]
    fn age_is_zero_for_future_mtime() {
        let now = SystemTime::now();
        assert_eq!(age_millis(now, now + Duration::from_secs(10)), 0);
        assert_eq!(age_millis(now, now - Duration::from_millis(1500)), 1500);
    }
}
