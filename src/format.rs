//! Input parsing and table output shared by the CLI and the terminal board.

use chrono::{Datelike, Duration, Local, NaiveDate};

use kanban_board::task::Task;

/// Lower-case a tag and join its words with hyphens.
pub fn normalise_tag(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

/// Accept repeated `--tag` values, each possibly comma-separated.
pub fn split_tags(inputs: &[String]) -> Vec<String> {
    let mut tags: Vec<String> = inputs
        .iter()
        .flat_map(|raw| raw.split(','))
        .map(normalise_tag)
        .filter(|t| !t.is_empty())
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

const WEEKDAYS: [(&str, &str); 7] = [
    ("monday", "mon"),
    ("tuesday", "tue"),
    ("wednesday", "wed"),
    ("thursday", "thu"),
    ("friday", "fri"),
    ("saturday", "sat"),
    ("sunday", "sun"),
];

fn weekday_index(name: &str) -> Option<i64> {
    WEEKDAYS
        .iter()
        .position(|(long, short)| name == *long || name == *short)
        .map(|i| i as i64)
}

/// Parse a due date: `today`, `tomorrow`, `eow`, `eom`, `in 3d`, `in 2w`,
/// `fri`, `next mon`, or ISO `YYYY-MM-DD`.
pub fn parse_due(input: &str, today: NaiveDate) -> Option<NaiveDate> {
    let s = input.trim().to_lowercase();
    let weekday = today.weekday().num_days_from_monday() as i64;

    match s.as_str() {
        "today" => return Some(today),
        "tomorrow" => return Some(today + Duration::days(1)),
        "yesterday" => return Some(today - Duration::days(1)),
        "eow" | "end of week" => return Some(today + Duration::days(6 - weekday)),
        "eom" | "end of month" => {
            let (year, month) = if today.month() == 12 {
                (today.year() + 1, 1)
            } else {
                (today.year(), today.month() + 1)
            };
            return NaiveDate::from_ymd_opt(year, month, 1).map(|d| d - Duration::days(1));
        }
        _ => {}
    }

    if let Some(rest) = s.strip_prefix("in ") {
        let rest = rest.trim();
        let (idx, _) = rest.char_indices().last()?;
        let (count, unit) = rest.split_at(idx);
        let count: i64 = count.trim().parse().ok()?;
        return match unit {
            "d" => Some(today + Duration::days(count)),
            "w" => Some(today + Duration::weeks(count)),
            _ => None,
        };
    }

    let (skip_week, name) = match s.strip_prefix("next ") {
        Some(name) => (true, name),
        None => (false, s.strip_prefix("this ").unwrap_or(&s)),
    };
    if let Some(target) = weekday_index(name) {
        let ahead = (target - weekday).rem_euclid(7);
        let ahead = if skip_week { ahead + 7 } else { ahead };
        return Some(today + Duration::days(ahead));
    }

    NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()
}

/// Due date relative to `today`: "today", "in 3d", "2d late".
pub fn format_due(due: Option<NaiveDate>, today: NaiveDate) -> String {
    let Some(due) = due else {
        return "-".into();
    };
    match (due - today).num_days() {
        0 => "today".into(),
        1 => "tomorrow".into(),
        n if n > 1 => format!("in {n}d"),
        n => format!("{}d late", -n),
    }
}

/// Cut `s` to `width` characters, ending in an ellipsis when shortened.
pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}

pub fn print_table(tasks: &[&Task]) {
    println!(
        "{:<6} {:<12} {:<7} {:<12} {:<10} {:<14} {}",
        "ID", "Status", "Pri", "Type", "Due", "Assignee", "Title [tags]"
    );
    let today = Local::now().date_naive();
    for t in tasks {
        let tags = if t.tags().is_empty() {
            String::new()
        } else {
            format!(" [{}]", t.tags().join(","))
        };
        let assignee = t.assignee.as_ref().map_or("-", |u| u.name.as_str());
        println!(
            "{:<6} {:<12} {:<7} {:<12} {:<10} {:<14} {}{}",
            truncate(t.id.as_str(), 6),
            t.status.title(),
            t.priority,
            t.task_type.map_or("-", |k| k.as_str()),
            format_due(t.due_date, today),
            truncate(assignee, 14),
            t.title,
            tags
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wednesday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 7).unwrap()
    }

    #[test]
    fn test_split_tags_normalises_and_dedups() {
        let tags = split_tags(&["Home Office, errands".into(), "errands".into(), " ".into()]);
        assert_eq!(tags, vec!["errands".to_string(), "home-office".to_string()]);
    }

    #[test]
    fn test_parse_due_keywords() {
        let today = wednesday();
        assert_eq!(parse_due("today", today), Some(today));
        assert_eq!(parse_due("Tomorrow", today), NaiveDate::from_ymd_opt(2026, 1, 8));
        assert_eq!(parse_due("eow", today), NaiveDate::from_ymd_opt(2026, 1, 11));
        assert_eq!(parse_due("eom", today), NaiveDate::from_ymd_opt(2026, 1, 31));
        assert_eq!(parse_due("in 3d", today), NaiveDate::from_ymd_opt(2026, 1, 10));
        assert_eq!(parse_due("in 2w", today), NaiveDate::from_ymd_opt(2026, 1, 21));
    }

    #[test]
    fn test_parse_due_weekdays() {
        let today = wednesday();
        assert_eq!(parse_due("fri", today), NaiveDate::from_ymd_opt(2026, 1, 9));
        assert_eq!(parse_due("wednesday", today), Some(today));
        assert_eq!(parse_due("next mon", today), NaiveDate::from_ymd_opt(2026, 1, 19));
        assert_eq!(parse_due("this sun", today), NaiveDate::from_ymd_opt(2026, 1, 11));
    }

    #[test]
    fn test_parse_due_iso_and_garbage() {
        let today = wednesday();
        assert_eq!(parse_due("2026-03-01", today), NaiveDate::from_ymd_opt(2026, 3, 1));
        assert_eq!(parse_due("in xd", today), None);
        assert_eq!(parse_due("someday", today), None);
    }

    #[test]
    fn test_format_due() {
        let today = wednesday();
        assert_eq!(format_due(None, today), "-");
        assert_eq!(format_due(Some(today), today), "today");
        assert_eq!(format_due(NaiveDate::from_ymd_opt(2026, 1, 12), today), "in 5d");
        assert_eq!(format_due(NaiveDate::from_ymd_opt(2026, 1, 5), today), "2d late");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer title", 6), "a lon…");
    }
}
