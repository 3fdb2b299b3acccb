// Print the batch aggregate of one run as JSON (summary only, or with records).
//
// Usage: cargo run --example dump_run -- RUN_ID [DB_PATH] [--records]
//   DB_PATH  default: ./data/ecocode.db

use ecowatch::aggregation;
use ecowatch::record_repo::RecordRepo;
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let Some(run_id) = args.get(1) else {
        anyhow::bail!("usage: dump_run RUN_ID [DB_PATH] [--records]");
    };
    let path = args
        .get(2)
        .map(String::as_str)
        .filter(|a| !a.starts_with("--"))
        .unwrap_or("./data/ecocode.db");
    let with_records = args.iter().any(|a| a == "--records");

    let repo = RecordRepo::connect(path, 1).await?;
    let records = repo.get_run_records(run_id).await?;
    let aggregate = aggregation::aggregate(run_id, &records)?;

    if with_records {
        println!("{}", serde_json::to_string_pretty(&aggregate)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&aggregate.summary())?);
    }
    Ok(())
}
