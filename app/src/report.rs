//! Terminal and JSON output for recommendation results

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use photo_quality::Photo;
use weekly_picks::WeeklyGroup;

pub fn print_weeks(groups: &[WeeklyGroup]) {
    println!("\n📈 WEEKLY PICKS");
    println!("==============");

    let total: usize = groups.iter().map(|g| g.photos.len()).sum();
    let picks: usize = groups.iter().map(|g| g.recommended.len()).sum();
    println!("Weeks: {}", groups.len());
    println!("Photos: {}", total);
    println!("Recommended: {}", picks);

    for group in groups {
        print!("{}", format_week(group));
    }
}

/// One week block: header, then every photo with ⭐ on the picks
pub fn format_week(group: &WeeklyGroup) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "\n🗓️  {} ({} – {})",
        group.week_id, group.start_date, group.end_date
    );
    let _ = writeln!(out, "  📸 Photos: {}", group.photos.len());

    for photo in &group.photos {
        let picked = group.recommended.iter().any(|p| p.id == photo.id);
        let marker = if picked { "⭐" } else { "  " };
        let _ = writeln!(out, "  {} {}{}", marker, display_name(photo), describe_score(photo));
    }
    out
}

fn display_name(photo: &Photo) -> String {
    photo
        .file_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| photo.file_path.display().to_string())
}

fn describe_score(photo: &Photo) -> String {
    match &photo.recommendation_score {
        None => " (not analyzed)".to_string(),
        Some(score) => match &score.cutoff_reason {
            Some(reason) => format!(" ✂️  {}", reason),
            None => format!(
                " ({:.1} - sharp {:.0}, expr {:.0}, light {:.0}, comp {:.0})",
                score.total_score,
                score.sharpness_score,
                score.expression_score,
                score.lighting_score,
                score.composition_score
            ),
        },
    }
}

pub fn write_json(groups: &[WeeklyGroup], path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(groups)
        .context("Failed to serialize weekly picks to JSON")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write output to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use photo_quality::{CutoffReason, RecommendationScore};
    use weekly_picks::WeekId;

    fn group() -> WeeklyGroup {
        let best = Photo::new(1, "/photos/best.jpg", 2).with_score(RecommendationScore {
            total_score: 81.5,
            ..Default::default()
        });
        let blurry = Photo::new(2, "/photos/blurry.jpg", 1)
            .with_score(RecommendationScore::cutoff(CutoffReason::Blurry));

        WeeklyGroup {
            week_id: WeekId::new(2025, 49),
            start_date: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 12, 7).unwrap(),
            photos: vec![best.clone(), blurry],
            recommended: vec![best],
        }
    }

    #[test]
    fn test_format_week_marks_picks_and_reasons() {
        let text = format_week(&group());

        assert!(text.contains("2025-W49 (2025-12-01 – 2025-12-07)"));
        assert!(text.contains("⭐ best.jpg (81.5 - sharp"));
        assert!(text.contains("   blurry.jpg ✂️  Severe shaking (Blurry)"));
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("picks.json");
        write_json(&[group()], &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value[0]["week_id"]["week_of_year"], 49);
        assert_eq!(value[0]["recommended"][0]["id"], 1);
        assert_eq!(
            value[0]["photos"][1]["recommendation_score"]["cutoff_reason"],
            "Severe shaking (Blurry)"
        );
    }
}
