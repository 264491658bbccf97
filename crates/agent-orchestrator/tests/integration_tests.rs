//! Integration tests for the recipe workflow orchestrator.

use agent_orchestrator::config::OrchestratorConfig;
use agent_orchestrator::metrics::RecordingMetricsSink;
use agent_orchestrator::workflow::WorkflowOrchestrator;
use recipe_collaborators::{InMemoryRecipeSink, StaticScrapeStep, StaticWebSearch};
use recipe_workflow_core::{Recipe, RecipeIngredient, WorkflowInitiatePayload};
use std::sync::Arc;

fn pasta_recipe() -> Recipe {
    Recipe {
        title: "Pasta Primavera".to_string(),
        instructions: vec!["boil pasta".to_string(), "toss vegetables".to_string()],
        prep_time: Some("10m".to_string()),
        cook_time: Some("15m".to_string()),
        total_time: Some("25m".to_string()),
        servings: Some("4".to_string()),
        source_url: String::new(),
        notes: None,
        ingredients: vec![
            RecipeIngredient {
                name: "pasta".to_string(),
                quantity: Some(1.0),
                unit: Some("lb".to_string()),
            },
            RecipeIngredient {
                name: "salt".to_string(),
                quantity: None,
                unit: None,
            },
        ],
    }
}

#[tokio::test]
async fn full_workflow_searches_scrapes_and_saves_every_url() {
    let metrics = Arc::new(RecordingMetricsSink::default());
    let sink = Arc::new(InMemoryRecipeSink::default());
    let urls = vec![
        "https://example.com/pasta-1".to_string(),
        "https://example.com/pasta-2".to_string(),
        "https://example.com/pasta-3".to_string(),
    ];

    let orchestrator = WorkflowOrchestrator::new(
        OrchestratorConfig {
            scrape_concurrency: 2,
            ..OrchestratorConfig::default()
        },
        metrics.clone(),
        Arc::new(StaticWebSearch(urls)),
        Arc::new(StaticScrapeStep { recipe: Some(pasta_recipe()) }),
        sink.clone(),
    );

    orchestrator
        .run_recipe_workflow_full(
            "recipe_workflow_full".to_string(),
            WorkflowInitiatePayload {
                search_query: "pasta primavera".to_string(),
                excluded_domains: vec!["badsite.com".to_string()],
                number_of_urls: 10,
            },
        )
        .await;

    let saved = sink.created.lock().await;
    assert_eq!(saved.len(), 3);
    assert_eq!(saved[0].created_from_query, "pasta primavera");
    assert_eq!(saved[0].recipe_ingredients[0].ingredient_name, "pasta");

    let events = metrics.events.lock().await;
    let completed_count = events
        .iter()
        .filter(|e| e.event_type == "recipe.saved")
        .count();
    assert_eq!(completed_count, 3);
    assert!(events.iter().any(|e| e.event_type == "workflow.completed"));
}

#[tokio::test]
async fn a_scrape_miss_does_not_block_the_remaining_urls() {
    let metrics = Arc::new(RecordingMetricsSink::default());
    let sink = Arc::new(InMemoryRecipeSink::default());

    // every URL "scrapes" to None here, simulating pages that were not recipes
    let orchestrator = WorkflowOrchestrator::new(
        OrchestratorConfig::default(),
        metrics.clone(),
        Arc::new(StaticWebSearch(vec![
            "https://example.com/not-a-recipe".to_string(),
        ])),
        Arc::new(StaticScrapeStep { recipe: None }),
        sink.clone(),
    );

    orchestrator
        .run_recipe_workflow_full(
            "recipe_workflow_full".to_string(),
            WorkflowInitiatePayload {
                search_query: "pasta".to_string(),
                excluded_domains: vec![],
                number_of_urls: 5,
            },
        )
        .await;

    assert!(sink.created.lock().await.is_empty());
    let events = metrics.events.lock().await;
    assert!(events.iter().any(|e| e.event_type == "workflow.completed"));
}
