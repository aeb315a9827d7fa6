//! CLI command definitions for prompt-forge.

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::enhance::{EnhanceOptions, Enhancement};
use crate::facets::FacetSnapshot;
use crate::lineage::{EntryType, PromptEntry};
use crate::llm::ProviderKind;
use crate::preset::Preset;
use crate::studio::PromptStudio;
use crate::template::{builtin, TemplatePatch};

/// Default configuration file.
const DEFAULT_CONFIG_PATH: &str = "prompt-forge.yaml";

/// Longest prompt text shown in list views.
const PREVIEW_CHARS: usize = 72;

/// Enhance image-generation prompts with LLM templates and keep their lineage.
#[derive(Parser)]
#[command(name = "prompt-forge")]
#[command(about = "Enhance image-generation prompts with LLM templates")]
#[command(version)]
#[command(
    long_about = "prompt-forge resolves enhancement templates, sends prompts to an LLM provider and records every original and enhanced prompt.\n\nExample usage:\n  prompt-forge enhance \"a cat on a roof\" --template narrative\n  prompt-forge history grouped"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Configuration file (YAML). Missing means defaults.
    #[arg(short, long, env = "PROMPT_FORGE_CONFIG", default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Override the data directory from the configuration file.
    #[arg(long, env = "PROMPT_FORGE_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Output JSON instead of human-readable text.
    #[arg(short = 'j', long, global = true)]
    pub json: bool,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Enhance a prompt with one or more templates.
    Enhance(EnhanceArgs),

    /// Show which instructions a template id resolves to.
    Resolve(ResolveArgs),

    /// Inspect and edit templates.
    #[command(alias = "tpl")]
    Templates(TemplatesArgs),

    /// Browse and manage the prompt history.
    History(HistoryArgs),

    /// Manage saved facet presets.
    Presets(PresetsArgs),
}

/// Arguments for `prompt-forge enhance`.
#[derive(Parser, Debug)]
pub struct EnhanceArgs {
    /// The prompt to enhance.
    pub prompt: String,

    /// Template id; repeat to enhance with several templates at once.
    #[arg(short, long = "template", default_value = builtin::DEFAULT_TEMPLATE_ID)]
    pub templates: Vec<String>,

    /// Instructions to use verbatim instead of the template's.
    #[arg(long)]
    pub instructions: Option<String>,

    /// Facet selections that produced the prompt, as a JSON object.
    #[arg(long)]
    pub facets: Option<String>,

    /// API key for this call (overrides the configured provider key).
    #[arg(long, env = "PROMPT_FORGE_API_KEY")]
    pub api_key: Option<String>,
}

/// Arguments for `prompt-forge resolve`.
#[derive(Parser, Debug)]
pub struct ResolveArgs {
    /// Template id to resolve.
    pub template_id: String,

    /// Explicit instructions, consulted before every other tier.
    #[arg(long)]
    pub instructions: Option<String>,
}

#[derive(Parser, Debug)]
pub struct TemplatesArgs {
    #[command(subcommand)]
    pub command: TemplatesSubcommand,
}

#[derive(clap::Subcommand, Debug)]
pub enum TemplatesSubcommand {
    /// List every known template with its effective source.
    List,

    /// Show the effective template for an id.
    Show {
        template_id: String,
    },

    /// Change template fields and save the result.
    Set(TemplateSetArgs),

    /// Save the effective template for an id as-is.
    Save {
        template_id: String,
    },

    /// Remove the saved template for an id, reverting to the built-in.
    Delete {
        template_id: String,
    },
}

/// Arguments for `prompt-forge templates set`.
#[derive(Parser, Debug)]
pub struct TemplateSetArgs {
    pub template_id: String,

    #[arg(long)]
    pub name: Option<String>,

    /// Enhancement instructions.
    #[arg(long)]
    pub master_prompt: Option<String>,

    #[arg(long)]
    pub format_template: Option<String>,

    #[arg(long)]
    pub usage_rules: Option<String>,

    /// Provider (openai, openrouter, anthropic, ollama).
    #[arg(long)]
    pub provider: Option<ProviderKind>,

    #[arg(long)]
    pub model: Option<String>,

    /// Allow conversational filler around the enhanced prompt.
    #[arg(long)]
    pub happy_talk: Option<bool>,

    #[arg(long)]
    pub compress: Option<bool>,

    /// Compression level, clamped to 1..=10.
    #[arg(long, allow_negative_numbers = true)]
    pub compression_level: Option<i64>,
}

#[derive(Parser, Debug)]
pub struct HistoryArgs {
    #[command(subcommand)]
    pub command: HistorySubcommand,
}

#[derive(clap::Subcommand, Debug)]
pub enum HistorySubcommand {
    /// List entries, newest first.
    List {
        /// Only selected entries.
        #[arg(long)]
        selected: bool,
    },

    /// List originals with their enhancements.
    Grouped,

    /// Toggle the selection of an entry.
    Select {
        id: String,

        /// Force selected.
        #[arg(long, conflicts_with = "off")]
        on: bool,

        /// Force deselected.
        #[arg(long)]
        off: bool,
    },

    /// Delete the whole history.
    Clear {
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },

    /// Convert the legacy flat history into lineage entries.
    Migrate,
}

#[derive(Parser, Debug)]
pub struct PresetsArgs {
    #[command(subcommand)]
    pub command: PresetsSubcommand,
}

#[derive(clap::Subcommand, Debug)]
pub enum PresetsSubcommand {
    /// List presets, favorites first.
    List,

    /// Save a new preset.
    Save {
        name: String,

        #[arg(short, long)]
        description: Option<String>,

        /// Facet selections as a JSON object.
        #[arg(long)]
        facets: Option<String>,

        #[arg(long)]
        favorite: bool,
    },

    /// Delete a preset.
    Delete { id: String },

    /// Flip the favorite flag of a preset.
    Favorite { id: String },

    /// Write every preset to a JSON document.
    Export {
        /// Output file; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Merge presets from an exported JSON document.
    Import { path: PathBuf },
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse CLI args and run the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let mut config = AppConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;
    if let Some(data_dir) = cli.data_dir {
        config = config.with_data_dir(data_dir);
    }

    if let Err(e) = crate::metrics::init_metrics() {
        warn!(error = %e, "Metrics disabled");
    }
    let studio = PromptStudio::open(config).context("Failed to initialize LLM providers")?;
    let json = cli.json;

    match cli.command {
        Commands::Enhance(args) => run_enhance_command(&studio, args, json).await?,
        Commands::Resolve(args) => run_resolve_command(&studio, args, json).await?,
        Commands::Templates(args) => run_templates_command(&studio, args.command, json).await?,
        Commands::History(args) => run_history_command(&studio, args.command, json).await?,
        Commands::Presets(args) => run_presets_command(&studio, args.command, json).await?,
    }

    if let Err(e) = studio.flush().await {
        warn!(error = %e, "Some changes could not be written");
    }
    Ok(())
}

// ============================================================================
// Enhancement
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EnhanceOutput {
    template_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    enhanced_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    diagnostics: Option<crate::enhance::EnhancementDiagnostics>,
}

async fn run_enhance_command(
    studio: &PromptStudio,
    args: EnhanceArgs,
    json: bool,
) -> anyhow::Result<()> {
    let mut options = EnhanceOptions::new().with_facets(parse_facets(args.facets.as_deref())?);
    if let Some(instructions) = args.instructions {
        options = options.with_override_instructions(instructions);
    }
    if let Some(api_key) = args.api_key {
        options = options.with_api_key(api_key);
    }

    let results = studio.enhance_many(&args.prompt, &args.templates, options).await;

    let outputs: Vec<EnhanceOutput> = results
        .into_iter()
        .map(|(template_id, outcome)| match outcome {
            Ok(Enhancement {
                enhanced_prompt,
                diagnostics,
                ..
            }) => EnhanceOutput {
                template_id,
                enhanced_prompt: Some(enhanced_prompt),
                error: None,
                error_kind: None,
                diagnostics: Some(diagnostics),
            },
            Err(failure) => EnhanceOutput {
                template_id,
                enhanced_prompt: None,
                error: Some(failure.error.to_string()),
                error_kind: Some(failure.error.kind()),
                diagnostics: failure.diagnostics,
            },
        })
        .collect();

    let failed = outputs.iter().filter(|o| o.error.is_some()).count();
    if json {
        println!("{}", serde_json::to_string_pretty(&outputs)?);
    } else {
        for output in &outputs {
            match (&output.enhanced_prompt, &output.error) {
                (Some(text), _) => {
                    let source = output
                        .diagnostics
                        .as_ref()
                        .map(|d| d.template_source.as_str())
                        .unwrap_or("unknown");
                    println!("[{}] ({})", output.template_id, source);
                    println!("{}", text);
                }
                (None, Some(error)) => println!("[{}] failed: {}", output.template_id, error),
                (None, None) => {}
            }
            println!();
        }
    }

    if failed == outputs.len() {
        anyhow::bail!("Enhancement failed for every template");
    }
    info!(templates = outputs.len(), failed, "Enhance command finished");
    Ok(())
}

async fn run_resolve_command(
    studio: &PromptStudio,
    args: ResolveArgs,
    json: bool,
) -> anyhow::Result<()> {
    let resolved = studio
        .resolve_template(&args.template_id, args.instructions.as_deref())
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&resolved)?);
        return Ok(());
    }

    println!("Template:  {}", resolved.template.id);
    println!("Source:    {}", resolved.source);
    println!(
        "Provider:  {} / {}",
        resolved.template.provider, resolved.template.model
    );
    if resolved.fallback_used() {
        println!("Fallback:  yes");
    }
    for error in &resolved.errors {
        println!("Warning:   {}: {}", error.error_type, error.message);
    }
    println!();
    println!("{}", resolved.instructions());
    Ok(())
}

// ============================================================================
// Templates
// ============================================================================

async fn run_templates_command(
    studio: &PromptStudio,
    command: TemplatesSubcommand,
    json: bool,
) -> anyhow::Result<()> {
    match command {
        TemplatesSubcommand::List => {
            let mut rows = Vec::new();
            for template in studio.list_templates() {
                let resolved = studio.resolve_template(&template.id, None).await;
                rows.push(resolved);
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for resolved in rows {
                    println!(
                        "{:<10} {:<18} {:<8} {}/{}",
                        resolved.template.id,
                        resolved.template.name,
                        resolved.source,
                        resolved.template.provider,
                        resolved.template.model
                    );
                }
            }
        }
        TemplatesSubcommand::Show { template_id } => {
            let resolved = studio.resolve_template(&template_id, None).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&resolved.template)?);
            } else {
                print_template(&resolved.template);
                println!("Source:            {}", resolved.source);
            }
        }
        TemplatesSubcommand::Set(args) => {
            let template_id = args.template_id.clone();
            load_working_copy(studio, &template_id).await?;
            studio.update_template(&template_id, &template_patch(args))?;
            let saved = studio.save_template(&template_id).await?;
            print_saved(&saved, json)?;
        }
        TemplatesSubcommand::Save { template_id } => {
            load_working_copy(studio, &template_id).await?;
            let saved = studio.save_template(&template_id).await?;
            print_saved(&saved, json)?;
        }
        TemplatesSubcommand::Delete { template_id } => {
            let removed = studio.delete_saved_template(&template_id).await?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "templateId": template_id, "removed": removed })
                );
            } else if removed {
                println!("Removed saved template '{}'", template_id);
            } else {
                println!("No saved template '{}'", template_id);
            }
        }
    }
    Ok(())
}

/// Seed the in-memory working copy from the effective template, so edits
/// apply on top of what is currently saved.
async fn load_working_copy(studio: &PromptStudio, template_id: &str) -> anyhow::Result<()> {
    let resolved = studio.resolve_template(template_id, None).await;
    studio.update_template(template_id, &TemplatePatch::from_template(&resolved.template))?;
    Ok(())
}

fn template_patch(args: TemplateSetArgs) -> TemplatePatch {
    TemplatePatch {
        name: args.name,
        master_prompt: args.master_prompt,
        format_template: args.format_template,
        usage_rules: args.usage_rules,
        provider: args.provider,
        model: args.model,
        use_happy_talk: args.happy_talk,
        compress_prompt: args.compress,
        compression_level: args.compression_level,
    }
}

fn print_template(template: &crate::template::Template) {
    println!("Template:          {} ({})", template.id, template.name);
    println!("Provider:          {} / {}", template.provider, template.model);
    println!("Happy talk:        {}", template.use_happy_talk);
    println!(
        "Compression:       {} (level {})",
        template.compress_prompt, template.compression_level
    );
    if !template.format_template.is_empty() {
        println!("Format template:   {}", template.format_template);
    }
    if !template.usage_rules.is_empty() {
        println!("Usage rules:       {}", template.usage_rules);
    }
    println!();
    println!("{}", template.master_prompt);
    println!();
}

fn print_saved(template: &crate::template::Template, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(template)?);
    } else {
        println!("✓ Saved template '{}'", template.id);
    }
    Ok(())
}

// ============================================================================
// History
// ============================================================================

async fn run_history_command(
    studio: &PromptStudio,
    command: HistorySubcommand,
    json: bool,
) -> anyhow::Result<()> {
    match command {
        HistorySubcommand::List { selected } => {
            let entries = if selected {
                studio.selected_history().await
            } else {
                studio.list_history().await
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("No history entries.");
            } else {
                for entry in &entries {
                    print_entry(entry, "");
                }
            }
        }
        HistorySubcommand::Grouped => {
            let groups = studio.grouped_history().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&groups)?);
            } else if groups.is_empty() {
                println!("No history entries.");
            } else {
                for group in &groups {
                    print_entry(&group.original, "");
                    for enhanced in &group.enhanced {
                        print_entry(enhanced, "  └ ");
                    }
                }
            }
        }
        HistorySubcommand::Select { id, on, off } => {
            let explicit = match (on, off) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let entry = studio.select_entry(&id, explicit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entry)?);
            } else {
                println!(
                    "{} {}",
                    if entry.is_selected { "Selected" } else { "Deselected" },
                    entry.id
                );
            }
        }
        HistorySubcommand::Clear { yes } => {
            if !yes {
                anyhow::bail!("Refusing to clear history without --yes");
            }
            studio.clear_history().await;
            if !json {
                println!("✓ History cleared");
            }
        }
        HistorySubcommand::Migrate => {
            let outcome = studio.migrate_history().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{:?}", outcome);
            }
        }
    }
    Ok(())
}

fn print_entry(entry: &PromptEntry, indent: &str) {
    let marker = match entry.entry_type {
        EntryType::Original => "O",
        EntryType::Enhanced => "E",
    };
    let selected = if entry.is_selected { "*" } else { " " };
    println!(
        "{}{}{} {} {} [{}] {}",
        indent,
        selected,
        marker,
        entry.id,
        entry.timestamp.format("%Y-%m-%d %H:%M"),
        entry.template_used,
        preview(entry.display_text())
    );
}

fn preview(text: &str) -> String {
    let single_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.chars().count() <= PREVIEW_CHARS {
        return single_line;
    }
    let cut: String = single_line.chars().take(PREVIEW_CHARS).collect();
    format!("{}…", cut)
}

// ============================================================================
// Presets
// ============================================================================

async fn run_presets_command(
    studio: &PromptStudio,
    command: PresetsSubcommand,
    json: bool,
) -> anyhow::Result<()> {
    match command {
        PresetsSubcommand::List => {
            let presets = studio.list_presets().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&presets)?);
            } else if presets.is_empty() {
                println!("No presets.");
            } else {
                for preset in &presets {
                    print_preset(preset);
                }
            }
        }
        PresetsSubcommand::Save {
            name,
            description,
            facets,
            favorite,
        } => {
            let options = parse_facets(facets.as_deref())?;
            let preset = studio
                .save_preset(&name, description.as_deref(), options, favorite)
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&preset)?);
            } else {
                println!("✓ Saved preset '{}' ({})", preset.name, preset.id);
            }
        }
        PresetsSubcommand::Delete { id } => {
            if !studio.delete_preset(&id).await {
                anyhow::bail!("Preset '{}' not found", id);
            }
            if !json {
                println!("✓ Deleted preset {}", id);
            }
        }
        PresetsSubcommand::Favorite { id } => {
            if !studio.toggle_favorite(&id).await {
                anyhow::bail!("Preset '{}' not found", id);
            }
            let favorite = studio.get_preset(&id).await.is_some_and(|p| p.favorite);
            if json {
                println!("{}", serde_json::json!({ "id": id, "favorite": favorite }));
            } else {
                println!("{} {}", if favorite { "Favorited" } else { "Unfavorited" }, id);
            }
        }
        PresetsSubcommand::Export { output } => {
            let document = serde_json::to_string_pretty(&studio.export_presets().await)?;
            match output {
                Some(path) => {
                    fs::write(&path, document)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!(path = %path.display(), "Exported presets");
                }
                None => println!("{}", document),
            }
        }
        PresetsSubcommand::Import { path } => {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let document: Value = serde_json::from_str(&contents)
                .with_context(|| format!("{} is not valid JSON", path.display()))?;
            let imported = studio
                .try_import_presets(&document)
                .await
                .context("Preset import rejected")?;
            if json {
                println!("{}", serde_json::json!({ "imported": imported }));
            } else {
                println!("✓ Imported {} presets", imported);
            }
        }
    }
    Ok(())
}

fn print_preset(preset: &Preset) {
    let star = if preset.favorite { "★" } else { " " };
    match &preset.description {
        Some(description) => println!("{} {} {} - {}", star, preset.id, preset.name, description),
        None => println!("{} {} {}", star, preset.id, preset.name),
    }
}

/// Parse a facet snapshot given on the command line.
fn parse_facets(raw: Option<&str>) -> anyhow::Result<FacetSnapshot> {
    let Some(raw) = raw else {
        return Ok(FacetSnapshot::new());
    };
    let value: Value = serde_json::from_str(raw).context("--facets must be valid JSON")?;
    Ok(FacetSnapshot::try_from(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_enhance_with_templates() {
        let cli = Cli::try_parse_from([
            "prompt-forge",
            "enhance",
            "a cat",
            "-t",
            "standard",
            "-t",
            "narrative",
            "--json",
        ])
        .expect("parse");

        assert!(cli.json);
        match cli.command {
            Commands::Enhance(args) => {
                assert_eq!(args.prompt, "a cat");
                assert_eq!(args.templates, vec!["standard", "narrative"]);
            }
            _ => panic!("expected enhance"),
        }
    }

    #[test]
    fn test_parse_template_set() {
        let cli = Cli::try_parse_from([
            "prompt-forge",
            "templates",
            "set",
            "custom1",
            "--provider",
            "anthropic",
            "--compression-level",
            "12",
        ])
        .expect("parse");

        match cli.command {
            Commands::Templates(TemplatesArgs {
                command: TemplatesSubcommand::Set(args),
            }) => {
                let patch = template_patch(args);
                assert_eq!(patch.provider, Some(ProviderKind::Anthropic));
                assert_eq!(patch.compression_level, Some(12));
                assert!(patch.master_prompt.is_none());
            }
            _ => panic!("expected templates set"),
        }
    }

    #[test]
    fn test_select_flags_conflict() {
        assert!(Cli::try_parse_from(["prompt-forge", "history", "select", "x", "--on", "--off"]).is_err());
    }

    #[test]
    fn test_parse_facets() {
        assert!(parse_facets(None).expect("empty").is_empty());
        let facets = parse_facets(Some(r#"{"pose": "standing"}"#)).expect("object");
        assert_eq!(facets.len(), 1);
        assert!(parse_facets(Some("[1]")).is_err());
        assert!(parse_facets(Some("{oops")).is_err());
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("a  cat\non a roof"), "a cat on a roof");
        let long = "x".repeat(PREVIEW_CHARS + 10);
        assert_eq!(preview(&long).chars().count(), PREVIEW_CHARS + 1);
    }
}
