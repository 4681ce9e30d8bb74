pub mod commands;

use clap::{Args, Parser, Subcommand};
use gym_core::models::PlanGroup;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[clap(name = "gym", about = "Front desk for gymdesk: members, stock, sales and sync")]
#[clap(version)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[clap(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage subscribers and their plans
    #[clap(subcommand, name = "members")]
    Members(MemberCommands),

    /// Manage inventory
    #[clap(subcommand, name = "products")]
    Products(ProductCommands),

    /// Record and review sales
    #[clap(subcommand, name = "sales")]
    Sales(SaleCommands),

    /// Manage the exercise catalog
    #[clap(subcommand, name = "courses")]
    Courses(CatalogCommands),

    /// Manage the diet catalog
    #[clap(subcommand, name = "diet")]
    Diet(CatalogCommands),

    /// Show connectivity, queue and database status
    #[clap(name = "status")]
    Status,

    /// Replay queued changes to the server now
    #[clap(name = "sync")]
    Sync {
        /// List the queued operations instead of syncing
        #[clap(long)]
        pending: bool,
    },

    /// Write a JSON backup of all data
    #[clap(name = "backup")]
    Backup {
        /// Directory to write the backup into
        #[clap(long, default_value = ".")]
        dir: PathBuf,
    },

    /// Check the database and optionally load sample data
    #[clap(name = "init")]
    Init {
        /// Seed empty catalogs and inventory with sample entries
        #[clap(long)]
        sample: bool,
    },
}

#[derive(Subcommand)]
pub enum MemberCommands {
    /// List subscribers, newest first
    #[clap(name = "ls")]
    List,

    /// Show a subscriber with course and diet plans
    #[clap(name = "show")]
    Show { id: Uuid },

    /// Register a new subscriber
    #[clap(name = "add")]
    Add(MemberArgs),

    /// Replace a subscriber's details and plans
    #[clap(name = "update")]
    Update {
        id: Uuid,
        #[clap(flatten)]
        member: MemberArgs,
    },

    /// Delete a subscriber
    #[clap(name = "rm")]
    Remove { id: Uuid },

    /// Search by name or phone
    #[clap(name = "search")]
    Search { term: String },
}

#[derive(Args, Debug, Clone)]
pub struct MemberArgs {
    /// Full name
    pub name: String,
    #[clap(long)]
    pub age: Option<u32>,
    /// Weight in kg
    #[clap(long)]
    pub weight: Option<f64>,
    /// Height in cm
    #[clap(long)]
    pub height: Option<f64>,
    #[clap(long)]
    pub phone: Option<String>,
    #[clap(long)]
    pub notes: Option<String>,
    /// Course group as "Title: item, item" (repeatable)
    #[clap(long = "course", value_parser = parse_group)]
    pub course_groups: Vec<PlanGroup>,
    /// Diet group as "Title: item, item" (repeatable)
    #[clap(long = "diet", value_parser = parse_group)]
    pub diet_groups: Vec<PlanGroup>,
}

#[derive(Subcommand)]
pub enum ProductCommands {
    /// List products alphabetically
    #[clap(name = "ls")]
    List,

    #[clap(name = "show")]
    Show { id: Uuid },

    /// Add a product to the inventory
    #[clap(name = "add")]
    Add(ProductArgs),

    /// Replace a product's details
    #[clap(name = "update")]
    Update {
        id: Uuid,
        #[clap(flatten)]
        product: ProductArgs,
    },

    /// Delete a product; past sales keep their copy of it
    #[clap(name = "rm")]
    Remove { id: Uuid },

    /// Search by name, description or category
    #[clap(name = "search")]
    Search { term: String },
}

#[derive(Args, Debug, Clone)]
pub struct ProductArgs {
    pub name: String,
    /// Units in stock
    #[clap(long, short)]
    pub quantity: i64,
    /// Unit price
    #[clap(long, short)]
    pub price: f64,
    #[clap(long)]
    pub category: Option<String>,
    #[clap(long)]
    pub description: Option<String>,
}

#[derive(Subcommand)]
pub enum SaleCommands {
    /// List sales, newest first
    #[clap(name = "ls")]
    List,

    /// Print the invoice of one sale
    #[clap(name = "show")]
    Show { id: Uuid },

    /// Sell a product, taking it out of stock
    #[clap(name = "add")]
    Add {
        /// Buyer name
        #[clap(long)]
        buyer: String,
        /// Product id
        #[clap(long)]
        product: Uuid,
        #[clap(long, short, default_value_t = 1)]
        quantity: i64,
        #[clap(long)]
        notes: Option<String>,
    },

    /// Delete a sale, putting its quantity back in stock
    #[clap(name = "rm")]
    Remove { id: Uuid },

    /// Search by buyer, product or notes
    #[clap(name = "search")]
    Search { term: String },
}

#[derive(Subcommand)]
pub enum CatalogCommands {
    #[clap(name = "ls")]
    List,

    #[clap(name = "add")]
    Add {
        name: String,
        #[clap(long)]
        description: Option<String>,
    },

    #[clap(name = "update")]
    Update {
        id: Uuid,
        name: String,
        #[clap(long)]
        description: Option<String>,
    },

    #[clap(name = "rm")]
    Remove { id: Uuid },
}

/// Parse `"Title: item, item"`; a bare title makes an empty group
pub fn parse_group(raw: &str) -> Result<PlanGroup, String> {
    let (title, items) = match raw.split_once(':') {
        Some((title, items)) => (title, items),
        None => (raw, ""),
    };
    if title.trim().is_empty() {
        return Err("group title is empty".to_string());
    }
    Ok(PlanGroup::new(
        title.trim(),
        items
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_syntax() {
        let group = parse_group("Push day: Bench press, Dips ,").unwrap();
        assert_eq!(group.title, "Push day");
        assert_eq!(group.items, ["Bench press", "Dips"]);

        assert!(parse_group("Cardio").unwrap().items.is_empty());
        assert!(parse_group(" : squat").is_err());
    }

    #[test]
    fn member_add_collects_repeated_groups() {
        let cli = Cli::try_parse_from([
            "gym",
            "members",
            "add",
            "Hana",
            "--age",
            "31",
            "--course",
            "Legs: Squat, Lunge",
            "--course",
            "Core: Plank",
            "--diet",
            "Breakfast: Oats",
        ])
        .unwrap();
        let Commands::Members(MemberCommands::Add(args)) = cli.command else {
            panic!("parsed into the wrong command");
        };
        assert_eq!(args.name, "Hana");
        assert_eq!(args.age, Some(31));
        assert_eq!(args.course_groups.len(), 2);
        assert_eq!(args.diet_groups[0].items, ["Oats"]);
    }

    #[test]
    fn sale_quantity_defaults_to_one() {
        let product = Uuid::new_v4();
        let product_arg = product.to_string();
        let cli = Cli::try_parse_from([
            "gym",
            "--json",
            "sales",
            "add",
            "--buyer",
            "Omar",
            "--product",
            product_arg.as_str(),
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Sales(SaleCommands::Add { quantity, product: p, .. }) => {
                assert_eq!(quantity, 1);
                assert_eq!(p, product);
            }
            _ => panic!("parsed into the wrong command"),
        }
    }
}
