use relay_core::pipeline::{PipelineReport, StageResult};
use relay_core::AwaitOutcome;
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

/// Left-aligned columns two spaces apart, with a dashed rule under the
/// header. Trailing padding is trimmed from every line.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let rule: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    let mut out = vec![
        table_line(headers.iter().copied(), &widths),
        table_line(rule.iter().map(String::as_str), &widths),
    ];
    out.extend(
        rows.iter()
            .map(|row| table_line(row.iter().map(String::as_str), &widths)),
    );
    out.join("\n")
}

fn table_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(cell, &w)| format!("{cell:w$}"))
        .collect();
    padded.join("  ").trim_end().to_string()
}

pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    println!("{}", render_table(headers, rows));
}

/// One line per job, plus the reason the session stopped.
pub fn print_outcome(outcome: &AwaitOutcome) {
    match outcome {
        AwaitOutcome::Completed { ticks, jobs } => {
            for job in jobs {
                println!("  ok       {job}");
            }
            println!("all {} job(s) succeeded after {ticks} poll(s)", jobs.len());
        }
        AwaitOutcome::Failed(report) => {
            for job in &report.resolved {
                println!("  ok       {job}");
            }
            println!("  FAILED   {} ({})", report.job, report.conclusion);
            if let Some(url) = &report.url {
                println!("           {url}");
            }
        }
        AwaitOutcome::DeadlineExceeded {
            ticks,
            pending,
            resolved,
        } => {
            for job in resolved {
                println!("  ok       {job}");
            }
            for job in pending {
                println!("  pending  {job}");
            }
            println!("gave up after {ticks} poll(s)");
        }
    }
}

pub fn print_pipeline(report: &PipelineReport) {
    for stage in &report.stages {
        match &stage.result {
            StageResult::Dispatched { count } => {
                println!("stage {}: dispatched {count} job(s), not waiting", stage.stage);
            }
            StageResult::Awaited { outcome } => {
                println!("stage {}:", stage.stage);
                print_outcome(outcome);
            }
        }
    }
}
