use chrono::Utc;
use personal_finance_rag::{llm::GeminiClient, pipeline::AnswerPipeline, store};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let question = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if question.trim().is_empty() {
        eprintln!("Usage: ask <question>");
        std::process::exit(2);
    }

    let gemini_api_key = std::env::var("GEMINI_API_KEY").unwrap_or_else(|_| {
        eprintln!("⚠️  GEMINI_API_KEY not set in .env");
        String::new()
    });

    let gemini = Arc::new(GeminiClient::new(gemini_api_key)?);
    let store = store::from_env();
    let pipeline = AnswerPipeline::new(gemini.clone(), gemini, store);

    let result = pipeline.answer(&question, Utc::now().date_naive()).await?;

    println!("{}", result.answer_text);
    println!();
    println!(
        "[category: {} | chunks used: {}]",
        result.resolved_category, result.chunk_count
    );

    Ok(())
}
