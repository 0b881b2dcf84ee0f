// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use oracle_contracts::PromptPurpose;
use serde_json::json;
use std::io::{self, Write};
use std::sync::Arc;
use strata::support::{ScriptedBackend, ScriptedOracle};
use strata::{
    AnalystEngine, EngineConfig, ProgressEvent, ProgressSink, Question, StaticContextStore,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

struct ConsoleSink;

impl ProgressSink for ConsoleSink {
    fn emit(&self, event: ProgressEvent) {
        println!("  [{}] stage: {}", event.attempt, event.stage);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    info!("Starting Strata Analyst Interactive Demo");

    dotenvy::dotenv().ok();
    info!("Environment variables loaded");

    // Scripted seams: one canned plan, artifact and interpretation per
    // question, plus an in-memory result set. Swap these for live
    // implementations of GenerationOracle and QueryBackend to run against
    // real services.
    let oracle = Arc::new(
        ScriptedOracle::new()
            .with_script(
                PromptPurpose::Decomposition,
                r#"{"tasks": [
  {"id": "t1", "question": "What was the engagement rate over the last week?", "intent": "measure engagement", "dependencies": []},
  {"id": "t2", "question": "Which posts drove the most engagement?", "intent": "rank posts", "dependencies": ["t1"]}
]}"#,
            )
            .with_script(
                PromptPurpose::ArtifactGeneration,
                "SELECT AVG(engagement_rate) FROM daily_metrics WHERE day > current_date - interval '7' day",
            )
            .with_script(
                PromptPurpose::ArtifactGeneration,
                "SELECT post_id, engagement FROM post_metrics ORDER BY engagement DESC LIMIT 5",
            )
            .with_fallback(
                "Your engagement rate last week averaged 4.2 percent, and your top post drew 1,824 interactions. Short videos performed noticeably better than image posts.",
            ),
    );
    let backend = Arc::new(
        ScriptedBackend::new()
            .with_result(Ok(json!([{"avg_engagement_rate": 4.2}])))
            .with_result(Ok(json!([
                {"post_id": "p-101", "engagement": 1824},
                {"post_id": "p-093", "engagement": 1310}
            ])))
            .with_fallback(Ok(json!([]))),
    );
    let context_store = Arc::new(StaticContextStore::new().with_summary(
        "demo-tenant",
        "The user manages a social media account and asked about reach yesterday.",
    ));

    let engine = AnalystEngine::new(oracle, backend, context_store, EngineConfig::default())
        .with_progress_sink(Arc::new(ConsoleSink));
    info!("Analyst engine initialised with scripted oracle and backend");

    println!("\nStrata Analyst Interactive Demo");
    println!("═══════════════════════════════════════════════════════════════");
    println!("Ask an analytical question and watch the engine plan, execute");
    println!("and interpret it. This demo runs against scripted responses, so");
    println!("the first question gets the full multi-task treatment and later");
    println!("ones fall back to single-task plans.");
    println!();
    println!("   Examples: \"What was my engagement rate last week?\"");
    println!("             \"Which posts performed best and why?\"");
    println!();
    println!("   - Type 'exit' to quit.");
    println!("═══════════════════════════════════════════════════════════════");

    loop {
        print!("\nEnter your question: ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input.eq_ignore_ascii_case("exit") {
            println!("Goodbye!");
            break;
        }

        println!("{}", "─".repeat(80));
        let question = Question::new(input, "demo-tenant");
        match engine
            .answer_question(&question, &CancellationToken::new())
            .await
        {
            Ok(answer) => {
                println!("\n{}", answer.text);
                if answer.degraded {
                    println!("\n(Parts of this answer could not be fully verified.)");
                }
                for warning in &answer.warnings {
                    println!("  note: {warning}");
                }
            }
            Err(e) => {
                println!("Could not process the question: {e}");
            }
        }
    }

    Ok(())
}
