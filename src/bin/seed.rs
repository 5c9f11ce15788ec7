use personal_finance_rag::{
    ingest::Ingestor, llm::GeminiClient, models::ChunkRecord, store,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("Usage: seed <chunks.json>");
        eprintln!("Expects a JSON array of {{text, category, date, source, amount?}} records");
        std::process::exit(2);
    };

    let gemini_api_key = std::env::var("GEMINI_API_KEY").unwrap_or_else(|_| {
        eprintln!("⚠️  GEMINI_API_KEY not set in .env");
        String::new()
    });

    let raw = std::fs::read_to_string(&path)?;
    let records: Vec<ChunkRecord> = serde_json::from_str(&raw)?;
    info!("Loaded {} chunk records from {}", records.len(), path);

    let gemini = Arc::new(GeminiClient::new(gemini_api_key)?);
    let store = store::from_env();
    let ingestor = Ingestor::new(gemini, store);

    let count = ingestor.ingest_batch(records).await?;
    info!("✅ Seeded {} chunks", count);

    Ok(())
}
