use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use iobtag::{
    create_label_vocabulary, create_prompts_file, create_transitions, evaluate_predictions_file,
    evaluate_span_results_file, label_span_file, postprocess_file, read_span_examples,
    DivByZeroStrat, Instruction, LabelVocabulary, Reporter, Scores, TaggingConfigBuilder,
    Transitions,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "iobtag",
    version,
    about = "Turn named-entity answers and character-span annotations into IOB2 tags"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Attach a prompt to every CoNLL-2003 example
    Prompts(PromptsArgs),
    /// Parse the model answers and write the predicted tags
    Postprocess(InputOutput),
    /// Score the predicted tags of a post-processed file against its gold tags
    Evaluate(EvaluateArgs),
    /// Score predicted character spans against gold character spans
    EvaluateSpans(EvaluateArgs),
    /// Label the subword tokens of span-annotated texts
    LabelSpans(LabelSpansArgs),
    /// Print the transition constraints of the labels of a span-annotated dataset
    Transitions(TransitionsArgs),
}

#[derive(Debug, Args)]
struct InputOutput {
    input: PathBuf,
    output: PathBuf,
}

#[derive(Debug, Args)]
struct PromptsArgs {
    #[command(flatten)]
    paths: InputOutput,
    /// Instruction template, from 1 to 5
    #[arg(short, long, default_value_t = Instruction::default())]
    instruction_number: Instruction,
}

#[derive(Debug, Args)]
struct EvaluateArgs {
    input: PathBuf,
    /// Fail instead of scoring 0 when a type is never predicted or never annotated
    #[arg(long)]
    strict_zero_division: bool,
}

#[derive(Debug, Args)]
struct LabelSpansArgs {
    #[command(flatten)]
    paths: InputOutput,
    #[arg(long, default_value_t = String::from(iobtag::DEFAULT_UNKNOWN_TOKEN))]
    unknown_token: String,
    #[arg(long, default_value_t = String::from(iobtag::DEFAULT_CONTINUATION_PREFIX))]
    continuation_prefix: String,
    /// Do not check that the tokens spell the text
    #[arg(long)]
    no_check: bool,
}

#[derive(Debug, Args)]
struct TransitionsArgs {
    input: PathBuf,
}

#[derive(Serialize)]
struct TransitionsOutput<'a> {
    labels: Vec<&'a str>,
    #[serde(flatten)]
    transitions: Transitions,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("iobtag=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Prompts(args) => {
            let count = create_prompts_file(
                &args.paths.input,
                &args.paths.output,
                args.instruction_number,
            )
            .with_context(|| format!("Could not create the prompts of {:?}", args.paths.input))?;
            println!("{} prompts written to {:?}", count, args.paths.output);
        }
        Commands::Postprocess(args) => {
            let summary = postprocess_file(&args.input, &args.output)
                .with_context(|| format!("Could not post-process {:?}", args.input))?;
            println!("{}", summary);
        }
        Commands::Evaluate(args) => {
            let (reporter, scores) =
                evaluate_predictions_file(&args.input, zero_division(args.strict_zero_division))
                    .with_context(|| format!("Could not evaluate {:?}", args.input))?;
            print_scores(&reporter, &scores)?;
        }
        Commands::EvaluateSpans(args) => {
            let (reporter, scores) =
                evaluate_span_results_file(&args.input, zero_division(args.strict_zero_division))
                    .with_context(|| format!("Could not evaluate {:?}", args.input))?;
            print_scores(&reporter, &scores)?;
        }
        Commands::LabelSpans(args) => {
            let config = TaggingConfigBuilder::new()
                .unknown_token(args.unknown_token)
                .continuation_prefix(args.continuation_prefix)
                .check_alignment(!args.no_check)
                .build();
            info!(config = %config, "labelling spans");
            let summary = label_span_file(&args.paths.input, &args.paths.output, &config)
                .with_context(|| format!("Could not label {:?}", args.paths.input))?;
            println!(
                "{} examples labelled, {} skipped, {} labels",
                summary.records,
                summary.skipped,
                summary.vocabulary.len()
            );
        }
        Commands::Transitions(args) => {
            let examples = read_span_examples(&args.input)
                .with_context(|| format!("Could not read {:?}", args.input))?;
            let vocabulary = create_label_vocabulary(&examples);
            println!("{}", transitions_json(&vocabulary)?);
        }
    }
    Ok(())
}

fn zero_division(strict: bool) -> DivByZeroStrat {
    if strict {
        DivByZeroStrat::ReturnError
    } else {
        DivByZeroStrat::ReplaceBy0
    }
}

fn print_scores(reporter: &Reporter, scores: &Scores) -> Result<()> {
    print!("{}", reporter);
    println!("{}", serde_json::to_string(scores)?);
    Ok(())
}

fn transitions_json(vocabulary: &LabelVocabulary) -> Result<String> {
    let output = TransitionsOutput {
        labels: vocabulary.iter().map(|(_, label)| label).collect(),
        transitions: create_transitions(vocabulary),
    };
    Ok(serde_json::to_string(&output)?)
}
