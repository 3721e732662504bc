//! Stage listing

use mramqual_core::config::QualConfig;
use mramqual_core::sequencer::QUALIFICATION_STAGES;

/// Print the qualification stage table with the budgets in effect
pub fn list_stages(config: &QualConfig) {
    println!("Qualification stages:");
    println!();
    println!(
        "{:>3} {:<22} {:<6} {:<4} {:<12} {:<17} {:<8} {:<7} {:>9}",
        "#", "Name", "Target", "ECC", "Pattern", "Preparation", "Access", "Family", "Budget"
    );
    println!("{}", "-".repeat(96));

    for (i, stage) in QUALIFICATION_STAGES.iter().enumerate() {
        let budget = stage.budget(&config.budgets);
        let family = match stage.family {
            Some(family) if stage.closes_family => format!("{}*", family.name()),
            Some(family) => family.name().to_string(),
            None => "-".to_string(),
        };
        println!(
            "{:>3} {:<22} {:<6} {:<4} {:<12} {:<17} {:<8} {:<7} {:>9}",
            i + 1,
            stage.name,
            stage.target.name(),
            if stage.ecc.is_on() { "on" } else { "off" },
            stage.pattern.name(),
            stage.preparation.name(),
            stage.access.name(),
            family,
            format!("{}/{}", budget.per_word_max, budget.per_region_max)
        );
    }

    println!();
    println!("Budget is per word / per pass. '*' marks the stage that checks the family total.");
}
