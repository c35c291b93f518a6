use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use scout_rs::scout::config::Configuration;
use scout_rs::scout::research::{ResearchAgent, ResearchOutcome, ResearchRequest};
use scout_rs::scout::server;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use this model for every role
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// `gemini` or `openai`; inferred from the model names when unset
    #[arg(long, global = true)]
    provider: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Research a question (or find videos) and print the answer
    Run {
        /// The question to research
        #[arg(short, long)]
        prompt: String,

        /// Maximum reflection passes before answering
        #[arg(long)]
        max_loops: Option<u32>,

        /// Number of search queries on the first pass
        #[arg(long)]
        initial_queries: Option<usize>,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(short, long, default_value_t = 8080)]
        port: u16,
    },
}

fn print_outcome(outcome: &ResearchOutcome) {
    println!("{}", outcome.text());
    if let ResearchOutcome::Answer { sources, .. } = outcome {
        if !sources.is_empty() {
            println!("\nSources:");
            for source in sources {
                println!("- {}: {}", source.label, source.value);
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();

    let mut config = Configuration::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(model) = args.model {
        config = config.with_model(model);
    }
    if let Some(provider) = args.provider {
        config.provider = Some(provider);
    }
    log::info!(
        "Models: query={} reflection={} answer={} search={}",
        config.query_generator_model,
        config.reflection_model,
        config.answer_model,
        config.search_model
    );

    let agent = ResearchAgent::from_config(config).context("building research agent")?;

    match args.command {
        Commands::Run {
            prompt,
            max_loops,
            initial_queries,
        } => {
            let mut request = ResearchRequest::new(prompt);
            request.max_research_loops = max_loops;
            request.initial_queries = initial_queries;

            let outcome = agent.run(request).await?;
            print_outcome(&outcome);
        }
        Commands::Serve { port } => {
            server::serve(port, agent).await?;
        }
    }

    Ok(())
}
