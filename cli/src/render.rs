//! Terminal rendering for analysis results.

use chrono::DateTime;
use chrono::Utc;
use vizor_protocol::report;
use vizor_protocol::AnalysisResult;

/// Print the full report for one analysis result.
pub fn print_report(result: &AnalysisResult, fetched_at: Option<DateTime<Utc>>) {
    if let Some(at) = fetched_at {
        println!("Fetched {}", at.to_rfc3339());
    }

    println!();
    println!("AI visibility    {:>6.1}", result.ai_visibility);
    println!("Avg position     {:>6.1}", result.avg_position);
    println!("Summarizability  {:>6.1}", result.avg_summarizability);

    let citations = report::citations_report(result);
    println!();
    println!("LLM citations: {}", citations.total);
    for (model, mentions) in &citations.breakdown {
        println!("  {model:<14} {mentions:>4}");
    }

    let scorecard = report::scorecard(result);
    println!();
    println!("Optimization scorecard (overall {}/100)", scorecard.overall);
    for row in &scorecard.rows {
        println!(
            "  {:<50} {:>3}%  {}",
            row.category, row.percentage, row.band
        );
    }

    let table = report::industry_table(result);
    if !table.is_empty() {
        println!();
        println!("Industry ranking");
        for row in &table {
            println!(
                "  {:>2}. {:<24} visibility {:>3}",
                row.rank, row.brand, row.visibility
            );
        }
    }

    if !result.sentiment.is_empty() {
        println!();
        println!("Sentiment highlights");
        for entry in &result.sentiment {
            println!("  [{}] {} ({:.2})", entry.name, entry.sentence, entry.score);
        }
    }
}
