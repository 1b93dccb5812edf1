// ABOUTME: CLI commands for project environments (create, destroy, status)
// ABOUTME: Connects the orchestrator from environment configuration and renders its results

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};
use invoker_environments::{
    EnvironmentConfig, EnvironmentOrchestrator, EnvironmentUrls, ProvisioningRecord,
    TeardownReport,
};
use serde::Serialize;
use tracing::debug;

/// Message shown for any provisioning failure
pub const UNAVAILABLE_MESSAGE: &str = "environment unavailable, please retry";

#[derive(Subcommand, Debug)]
pub enum EnvironmentCommands {
    /// Create (or replace) the environment of a project
    Create {
        /// Project ID
        #[arg(long)]
        project: String,
        /// Owning user ID
        #[arg(long)]
        user: String,
        /// Project template (next or react)
        #[arg(long, default_value = "next")]
        template: String,
    },
    /// Tear down the environment of a project
    Destroy {
        /// Project ID
        #[arg(long)]
        project: String,
    },
    /// Show the provisioning record of a project
    Status {
        /// Project ID
        #[arg(long)]
        project: String,
        /// Print the record as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn handle_environment_command(command: EnvironmentCommands) -> Result<()> {
    let config = EnvironmentConfig::from_env().context("Failed to load configuration")?;
    debug!(
        "Using cluster {} behind listener {}",
        config.compute.cluster, config.listener_arn
    );
    let orchestrator = EnvironmentOrchestrator::connect(&config)
        .await
        .context("Failed to initialize the provisioning orchestrator")?;

    match command {
        EnvironmentCommands::Create {
            project,
            user,
            template,
        } => create_environment(&orchestrator, &project, &user, &template).await,
        EnvironmentCommands::Destroy { project } => {
            destroy_environment(&orchestrator, &project).await
        }
        EnvironmentCommands::Status { project, json } => {
            show_status(&orchestrator, &project, json).await
        }
    }
}

async fn create_environment(
    orchestrator: &EnvironmentOrchestrator,
    project: &str,
    user: &str,
    template: &str,
) -> Result<()> {
    println!(
        "{}",
        format!("🚀 Creating environment for project {}", project)
            .blue()
            .bold()
    );

    let environment = match orchestrator.create_environment(project, user, template).await {
        Ok(environment) => environment,
        Err(e) => {
            if let Some(rollback) = e.rollback() {
                print_report_failures("Rollback could not remove", rollback);
            }
            return Err(anyhow::Error::new(e).context(UNAVAILABLE_MESSAGE));
        }
    };

    if let Some(replaced) = &environment.replaced {
        println!("{}", "Replaced the previous environment".dimmed());
        print_report_failures("Previous environment left behind", replaced);
    }

    for warning in &environment.dns_warnings {
        println!("{} DNS not updated: {}", "⚠️".yellow(), warning);
    }

    println!("{}", "✅ Environment ready".green().bold());
    print_urls(&environment.urls);
    Ok(())
}

async fn destroy_environment(orchestrator: &EnvironmentOrchestrator, project: &str) -> Result<()> {
    let existed = orchestrator.status(project).await?.is_some();
    if !existed {
        println!(
            "{}",
            format!("No environment found for project {}", project).yellow()
        );
        return Ok(());
    }

    println!(
        "{}",
        format!("🧹 Destroying environment for project {}", project)
            .blue()
            .bold()
    );

    let report = orchestrator.destroy_environment(project).await?;

    for warning in &report.warnings {
        println!("{} {}", "ℹ️".cyan(), warning.dimmed());
    }
    print_report_failures("Teardown could not remove", &report);

    if report.is_clean() {
        println!("{}", "✅ Environment destroyed".green().bold());
    } else {
        println!(
            "{}",
            "✅ Environment destroyed (some resources may need manual cleanup)".green()
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct StatusOutput<'a> {
    project_id: &'a str,
    provisioned: bool,
    urls: Option<EnvironmentUrls>,
    record: Option<ProvisioningRecord>,
}

async fn show_status(
    orchestrator: &EnvironmentOrchestrator,
    project: &str,
    json: bool,
) -> Result<()> {
    let record = orchestrator.status(project).await?;

    if json {
        let output = StatusOutput {
            project_id: project,
            provisioned: record.is_some(),
            urls: record.as_ref().map(|_| orchestrator.urls(project)),
            record,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    match record {
        Some(record) => {
            println!(
                "{}",
                format!("📦 Environment - {}", project).blue().bold()
            );
            println!();
            println!("{}", record_table(&record));
            print_urls(&orchestrator.urls(project));
        }
        None => {
            println!(
                "{}",
                format!("No environment found for project {}", project).yellow()
            );
        }
    }
    Ok(())
}

fn print_urls(urls: &EnvironmentUrls) {
    println!("  {} {}", "Backend: ".bold(), urls.backend.cyan());
    println!("  {} {}", "Frontend:".bold(), urls.frontend.cyan());
}

fn print_report_failures(heading: &str, report: &TeardownReport) {
    for failure in &report.failures {
        println!(
            "{} {} {} ({}): {}",
            "⚠️".yellow(),
            heading,
            failure.resource,
            failure.step,
            failure.error.dimmed()
        );
    }
}

pub(crate) fn record_table(record: &ProvisioningRecord) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec!["Resource", "Identifier"]);

    let rows = [
        ("Service", &record.service_id),
        ("Task definition", &record.task_definition_id),
        ("Target group (control)", &record.target_group1_id),
        ("Target group (serving)", &record.target_group2_id),
        ("Listener rule (backend)", &record.listener_rule1_id),
        ("Listener rule (frontend)", &record.listener_rule2_id),
    ];
    for (label, id) in rows {
        table.add_row(vec![label, id.as_deref().unwrap_or("-")]);
    }

    table.add_row(vec![
        "Created".to_string(),
        record.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    ]);
    table.add_row(vec![
        "Updated".to_string(),
        record.updated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    ]);

    table
}
