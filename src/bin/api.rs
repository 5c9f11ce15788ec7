use personal_finance_rag::{api::start_server, llm::GeminiClient, pipeline::AnswerPipeline, store};
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

    let gemini_api_key = std::env::var("GEMINI_API_KEY").unwrap_or_else(|_| {
        eprintln!("⚠️  GEMINI_API_KEY not set in .env");
        eprintln!("📌 See .env.example for setup instructions");
        String::new()
    });

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("🚀 Personal Finance RAG - API Server");
    info!("📍 Port: {}", api_port);

    // Create components
    let gemini = Arc::new(GeminiClient::new(gemini_api_key)?);
    let store = store::from_env();
    let pipeline = Arc::new(AnswerPipeline::new(gemini.clone(), gemini, store));

    info!("✅ Answer pipeline initialized");
    info!("📡 Starting API server...");

    // Start API server
    start_server(pipeline, api_port).await?;

    Ok(())
}
