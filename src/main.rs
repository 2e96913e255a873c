use std::collections::HashMap;
use std::sync::Arc;

use consult_engine::adapters::{Expert, HttpExpert};
use consult_engine::classifier::Classifier;
use consult_engine::config::{load_expert_endpoints, Settings};
use consult_engine::domain::expert::ExpertName;
use consult_engine::moderator::DebateModerator;
use consult_engine::monitoring::Monitoring;
use consult_engine::retrieval_provider::RetrievalProvider;
use consult_engine::session_store::CompositeSessionStore;
use consult_engine::workflow::WorkflowEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    dotenvy::dotenv().ok();

    tracing::info!("consult-engine starting");

    let settings = Settings::from_env();
    let client = reqwest::Client::new();

    let mut experts: HashMap<ExpertName, Arc<dyn Expert>> = HashMap::new();
    let mut moderator_backing: Option<Arc<dyn Expert>> = None;
    for endpoint in load_expert_endpoints() {
        let name = endpoint.name;
        let adapter: Arc<dyn Expert> = Arc::new(HttpExpert::new(
            client.clone(),
            endpoint,
            settings.confidence_floor,
            settings.confidence_ceiling,
        ));
        if name == ExpertName::D {
            moderator_backing = Some(adapter);
        } else {
            experts.insert(name, adapter);
        }
    }
    let moderator_backing =
        moderator_backing.expect("load_expert_endpoints always includes the moderator's D endpoint");

    let classifier = Classifier::new();
    let retrieval = RetrievalProvider::new(None, None, settings.retrieval_timeout);
    let monitoring = Arc::new(Monitoring::new());
    let moderator = DebateModerator::new(moderator_backing, monitoring.clone());
    let store = Arc::new(CompositeSessionStore::local_only());

    let engine = WorkflowEngine::new(
        settings,
        experts,
        classifier,
        retrieval,
        moderator,
        store,
        monitoring,
    );

    let question = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "The press brake is making a grinding noise during the down stroke".to_string());

    let outcome = engine
        .run_turn(None, "cli-operator".to_string(), question, None, None)
        .await?;

    println!("session: {}", outcome.session_id);
    println!("turn: {}", outcome.conversation_count);
    println!(
        "experts consulted: {:?}",
        outcome.participating_experts
    );
    if !outcome.failed_experts.is_empty() {
        println!("failed experts: {:?}", outcome.failed_experts);
    }
    println!("confidence: {:.2}", outcome.recommendation.confidence_level);
    println!("\n{}", outcome.recommendation.executive_summary);

    tracing::info!("consult-engine turn complete");
    Ok(())
}
