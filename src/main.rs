use std::time::Duration;

use log::info;
use tabular_orchestra::{config::RunConfig, walkthrough};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = RunConfig::from_env()?;
    info!(seed = config.seed; "starting walkthrough");

    for summary in walkthrough::run(&config)? {
        println!(
            "\n== {} ({} train / {} test rows), best model: {}",
            summary.dataset, summary.train_rows, summary.test_rows, summary.best_model
        );
        println!("first predictions: {}", summary.sample.join(", "));
        println!(
            "{:<22} {:>10} {:>10} {:>10} {:>10} {:>5}",
            "model", "score_test", "score_val", "fit_time", "pred_time", "level"
        );

        for row in &summary.leaderboard {
            let score_val = row
                .score_val
                .map_or_else(|| "-".to_string(), |s| format!("{s:.4}"));
            println!(
                "{:<22} {:>10.4} {:>10} {:>10} {:>10} {:>5}",
                row.model,
                row.score_test,
                score_val,
                millis(row.fit_time),
                millis(row.pred_time_test),
                row.stack_level
            );
        }
    }

    Ok(())
}

fn millis(d: Duration) -> String {
    format!("{:.1}ms", d.as_secs_f64() * 1e3)
}
