use crate::coverage::{CoverageHeatmap, DailyCoverage};
use crate::{ExposurePhase, ParticipantId, PhaseMatrix};
use anyhow::{Context, Result};
use log::{info, warn};
use plotters::prelude::*;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Bar colours of the stacked availability chart
fn bar_color(phase: ExposurePhase) -> RGBColor {
    match phase {
        ExposurePhase::Pre => RGBColor(0, 0, 139),
        ExposurePhase::Intra => RGBColor(139, 0, 0),
        ExposurePhase::Post => RGBColor(0, 100, 0),
    }
}

/// Layer colours of the heatmap
fn heatmap_color(phase: ExposurePhase) -> RGBColor {
    match phase {
        ExposurePhase::Pre => RGBColor(8, 81, 156),
        ExposurePhase::Intra => RGBColor(217, 72, 1),
        ExposurePhase::Post => RGBColor(0, 109, 44),
    }
}

pub fn print_matrix<T>(title: &str, matrix: &PhaseMatrix<T>, fmt: impl Fn(&T) -> String) {
    println!("\n{}", title);
    println!(
        "  {:<16} {:>12} {:>12} {:>12}",
        "participant",
        ExposurePhase::Pre.label(),
        ExposurePhase::Intra.label(),
        ExposurePhase::Post.label()
    );
    for (participant, values) in matrix.iter() {
        println!(
            "  {:<16} {:>12} {:>12} {:>12}",
            participant.as_str(),
            fmt(&values[0]),
            fmt(&values[1]),
            fmt(&values[2])
        );
    }
}

pub fn format_rate(rate: &Option<f64>) -> String {
    rate.map(|hz| format!("{:.2} Hz", hz)).unwrap_or_else(|| "-".to_string())
}

pub fn print_daily_coverage(days: &[DailyCoverage]) {
    println!("\nMinutes of data per day");
    for day in days {
        println!(
            "  {:<16} {:<6} {} {:>5} min",
            day.participant.as_str(),
            day.phase.label(),
            day.date.format("%Y-%m-%d"),
            day.minutes
        );
    }
}

/// Stacked bars per participant, one segment per exposure phase
pub fn render_stacked_bars(path: &Path, title: &str, y_label: &str, matrix: &PhaseMatrix<f64>) -> Result<()> {
    if matrix.is_empty() {
        warn!("Nothing to plot for '{}'", title);
        return Ok(());
    }

    let participants: Vec<String> = matrix.participants().map(|p| p.to_string()).collect();
    let y_max = matrix
        .iter()
        .map(|(_, values)| values.iter().sum::<f64>())
        .fold(0.0, f64::max)
        .max(1.0)
        * 1.1;

    let root = SVGBackend::new(path, (1200, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 22))
        .margin(15)
        .x_label_area_size(60)
        .y_label_area_size(70)
        .build_cartesian_2d((0..participants.len()).into_segmented(), 0f64..y_max)?;

    let x_label = |v: &SegmentValue<usize>| match v {
        SegmentValue::CenterOf(i) => participants.get(*i).cloned().unwrap_or_default(),
        _ => String::new(),
    };
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(participants.len() + 1)
        .x_label_formatter(&x_label)
        .y_desc(y_label)
        .draw()?;

    let mut bottoms = vec![0.0; participants.len()];
    for (slot, phase) in ExposurePhase::ALL.into_iter().enumerate() {
        let color = bar_color(phase);
        let bars: Vec<Rectangle<(SegmentValue<usize>, f64)>> = matrix
            .iter()
            .enumerate()
            .map(|(i, (_, values))| {
                let base = bottoms[i];
                bottoms[i] += values[slot];
                let mut bar = Rectangle::new(
                    [
                        (SegmentValue::Exact(i), base),
                        (SegmentValue::Exact(i + 1), base + values[slot]),
                    ],
                    color.filled(),
                );
                bar.set_margin(0, 0, 8, 8);
                bar
            })
            .collect();

        chart
            .draw_series(bars)?
            .label(phase.label())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()
        .with_context(|| format!("Failed to write chart {}", path.display()))?;
    info!("Chart written to {}", path.display());
    Ok(())
}

/// Date × time-of-day grid with one coloured layer per phase
pub fn render_heatmap(path: &Path, heatmap: &CoverageHeatmap) -> Result<()> {
    let dates = &heatmap.dates;
    let hours_per_bin = 24.0 / heatmap.bins.len().max(1) as f64;
    let height = (200 + 24 * dates.len() as u32).min(2000);

    let root = SVGBackend::new(path, (1400, height)).into_drawing_area();
    root.fill(&WHITE)?;

    let title = format!("Data Availability Heatmap for {}", heatmap.participant);
    let mut chart = ChartBuilder::on(&root)
        .caption(&title, ("sans-serif", 22))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(100)
        .build_cartesian_2d(0f64..24f64, (0..dates.len()).into_segmented())?;

    let y_label = |v: &SegmentValue<usize>| match v {
        SegmentValue::CenterOf(i) => dates
            .get(*i)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        _ => String::new(),
    };
    let x_label = |h: &f64| format!("{:02}:00", *h as u32);
    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(25)
        .x_label_formatter(&x_label)
        .y_labels(dates.len() + 1)
        .y_label_formatter(&y_label)
        .x_desc("Time of day")
        .y_desc("Date")
        .draw()?;

    for layer in &heatmap.layers {
        let color = heatmap_color(layer.phase);
        let cells: Vec<Rectangle<(f64, SegmentValue<usize>)>> = layer
            .present_cells()
            .map(|(d, b)| {
                let x0 = b as f64 * hours_per_bin;
                Rectangle::new(
                    [
                        (x0, SegmentValue::Exact(d)),
                        (x0 + hours_per_bin, SegmentValue::Exact(d + 1)),
                    ],
                    color.filled(),
                )
            })
            .collect();

        chart
            .draw_series(cells)?
            .label(layer.phase.label())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::LowerRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()
        .with_context(|| format!("Failed to write chart {}", path.display()))?;
    info!("Heatmap written to {}", path.display());
    Ok(())
}

/// Minutes of data per day for one participant, bars grouped by phase
pub fn render_daily_coverage(path: &Path, participant: &ParticipantId, days: &[DailyCoverage]) -> Result<()> {
    let days: Vec<&DailyCoverage> = days.iter().filter(|d| d.participant == *participant).collect();
    if days.is_empty() {
        warn!("No daily coverage to plot for {}", participant);
        return Ok(());
    }

    let dates: Vec<_> = days.iter().map(|d| d.date).collect::<BTreeSet<_>>().into_iter().collect();
    // three phase bars and one spacer per date
    let group = ExposurePhase::ALL.len() + 1;
    let slots = dates.len() * group;
    let y_max = days.iter().map(|d| d.minutes).max().unwrap_or(0).max(1) as f64 * 1.1;

    let root = SVGBackend::new(path, ((120 * dates.len() as u32).clamp(600, 2400), 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let title = format!("Data Coverage per Day for {}", participant);
    let mut chart = ChartBuilder::on(&root)
        .caption(&title, ("sans-serif", 22))
        .margin(15)
        .x_label_area_size(60)
        .y_label_area_size(70)
        .build_cartesian_2d((0..slots).into_segmented(), 0f64..y_max)?;

    let x_label = |v: &SegmentValue<usize>| match v {
        SegmentValue::CenterOf(i) if i % group == 1 => dates
            .get(i / group)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        _ => String::new(),
    };
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(slots + 1)
        .x_label_formatter(&x_label)
        .y_desc("Minutes of data")
        .draw()?;

    for (slot, phase) in ExposurePhase::ALL.into_iter().enumerate() {
        let color = bar_color(phase);
        let bars: Vec<Rectangle<(SegmentValue<usize>, f64)>> = days
            .iter()
            .filter(|d| d.phase == phase)
            .filter_map(|d| {
                let x = dates.binary_search(&d.date).ok()? * group + slot;
                let mut bar = Rectangle::new(
                    [
                        (SegmentValue::Exact(x), 0.0),
                        (SegmentValue::Exact(x + 1), d.minutes as f64),
                    ],
                    color.filled(),
                );
                bar.set_margin(0, 0, 1, 1);
                Some(bar)
            })
            .collect();

        chart
            .draw_series(bars)?
            .label(phase.label())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()
        .with_context(|| format!("Failed to write chart {}", path.display()))?;
    info!("Daily coverage chart written to {}", path.display());
    Ok(())
}

fn file_safe(participant: &ParticipantId) -> String {
    participant
        .as_str()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// File name for a participant's heatmap, safe for any participant id
pub fn heatmap_path(dir: &Path, heatmap: &CoverageHeatmap) -> PathBuf {
    dir.join(format!("heatmap_{}.svg", file_safe(&heatmap.participant)))
}

pub fn daily_coverage_path(dir: &Path, participant: &ParticipantId) -> PathBuf {
    dir.join(format!("daily_coverage_{}.svg", file_safe(participant)))
}
