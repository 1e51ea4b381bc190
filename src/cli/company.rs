use std::ops::Deref;

use anyhow::Result;
use clap::Subcommand;

use crate::{
    aggregation::filter_by_name,
    companies::CompanyForm,
    context::Tracker,
    earnings::format_earnings,
    error::TrackerError,
    model::CompanyId,
    store::CompanyStore,
    utils::time::format_duration,
};

use super::loaded_value;

#[derive(Subcommand, Debug)]
pub enum CompanyCommand {
    #[command(about = "Add a company")]
    Add {
        name: String,
        #[arg(help = "Hourly rate, for example 42.5")]
        rate: String,
    },
    #[command(about = "Rename a company or change its rate")]
    Edit {
        id: CompanyId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        rate: Option<String>,
    },
    #[command(about = "Delete a company together with all of its logged time")]
    Delete { id: CompanyId },
    #[command(about = "List companies with their totals")]
    List {
        #[arg(short, long, help = "Only show companies whose name contains this")]
        search: Option<String>,
    },
}

pub async fn process_company_command(tracker: &Tracker, command: CompanyCommand) -> Result<()> {
    let editor = tracker.companies();
    match command {
        CompanyCommand::Add { name, rate } => {
            let company = editor
                .save(CompanyForm {
                    id: None,
                    name,
                    rate,
                })
                .await?;
            println!("Added {} {} at {}", company.id, company.name, company.hourly_rate);
        }
        CompanyCommand::Edit { id, name, rate } => {
            // unspecified fields keep their current value
            let current = tracker
                .store()
                .get_by_id(id)
                .await?
                .ok_or(TrackerError::NotFound(id))?;
            let company = editor
                .save(CompanyForm {
                    id: Some(id),
                    name: name.unwrap_or_else(|| current.name.to_string()),
                    rate: rate.unwrap_or_else(|| current.hourly_rate.deref().to_string()),
                })
                .await?;
            println!("Updated {} {} at {}", company.id, company.name, company.hourly_rate);
        }
        CompanyCommand::Delete { id } => {
            editor.delete(id).await?;
            println!("Deleted {id}");
        }
        CompanyCommand::List { search } => {
            let listing = loaded_value(tracker.directory().loaded().await)?;
            let query = search.unwrap_or_default();
            let mut empty = true;
            for company in filter_by_name(&listing, &query) {
                empty = false;
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    company.company_id,
                    company.company_name,
                    company.hourly_rate,
                    format_duration(company.total_duration_millis),
                    format_earnings(company.total_earnings)
                );
            }
            if empty {
                println!("No companies found");
            }
        }
    }
    Ok(())
}
