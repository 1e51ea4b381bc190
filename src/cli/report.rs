use anyhow::Result;
use chrono::Local;

use crate::{
    context::Tracker,
    earnings::{earnings, format_earnings},
    model::CompanyId,
    utils::time::format_duration,
};

use super::loaded_value;

pub async fn print_dashboard(tracker: &Tracker) -> Result<()> {
    let snapshot = loaded_value(tracker.dashboard().loaded().await)?;
    if snapshot.companies.is_empty() {
        println!("Nothing logged yet");
        return Ok(());
    }
    for company in &snapshot.companies {
        println!(
            "{}\t{}\t{}\t{}",
            company.company_name,
            company.hourly_rate,
            format_duration(company.total_duration_millis),
            format_earnings(company.total_earnings)
        );
    }
    println!();
    println!("Total earned\t{}", format_earnings(snapshot.total_earnings));
    Ok(())
}

pub async fn print_detail(tracker: &Tracker, id: CompanyId) -> Result<()> {
    let details = loaded_value(tracker.company_detail(id).loaded().await)?;
    let Some(company) = details.company else {
        return Ok(());
    };

    println!("{} {} at {}", company.id, company.name, company.hourly_rate);
    for interval in &details.intervals {
        println!(
            "{}\t{}\t{}",
            interval.start.with_timezone(&Local).format("%x %H:%M"),
            format_duration(interval.duration_millis),
            format_earnings(earnings(interval.duration_millis, company.hourly_rate))
        );
    }
    println!();
    println!(
        "Total\t{}\t{}",
        format_duration(details.total_duration_millis),
        format_earnings(details.total_earnings)
    );
    Ok(())
}
