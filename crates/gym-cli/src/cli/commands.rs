use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

use crate::cli::{CatalogCommands, MemberArgs, MemberCommands, ProductArgs, ProductCommands, SaleCommands};
use gym_core::models::{
    CatalogForm, CatalogItem, CatalogKind, Product, ProductForm, Sale, SaleForm, Subscriber,
    SubscriberForm, SubscriberWithGroups,
};
use gym_core::{DataAccess, InventorySummary, LOW_STOCK_THRESHOLD};

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Ids as listed, in the form every `show`, `update` and `rm` accepts
pub fn listed_id(id: &Uuid) -> String {
    id.hyphenated().to_string()
}

fn member_form(args: MemberArgs) -> SubscriberForm {
    SubscriberForm {
        name: args.name,
        age: args.age,
        weight: args.weight,
        height: args.height,
        phone: args.phone,
        notes: args.notes,
        course_groups: args.course_groups,
        diet_groups: args.diet_groups,
    }
}

fn product_form(args: ProductArgs) -> ProductForm {
    ProductForm {
        name: args.name,
        quantity: args.quantity,
        price: args.price,
        category: args.category,
        description: args.description,
    }
}

/// One line per subscriber
fn print_members(members: &[Subscriber]) {
    if members.is_empty() {
        println!("No subscribers found. Register one with 'gym members add <name>'");
        return;
    }
    for m in members {
        let phone = m.phone.as_deref().unwrap_or("-");
        println!(
            "  {}  {:<28} {:<16} joined {}",
            listed_id(&m.id).dimmed(),
            m.name,
            phone,
            m.created_at.format("%Y-%m-%d")
        );
    }
}

fn print_member_card(record: &SubscriberWithGroups) {
    let s = &record.subscriber;
    println!("{}", s.name.bold());
    println!("  id:      {}", s.id);
    if let Some(age) = s.age {
        println!("  age:     {age}");
    }
    if let Some(weight) = s.weight {
        println!("  weight:  {weight} kg");
    }
    if let Some(height) = s.height {
        println!("  height:  {height} cm");
    }
    if let Some(phone) = &s.phone {
        println!("  phone:   {phone}");
    }
    if let Some(notes) = &s.notes {
        println!("  notes:   {notes}");
    }
    for (label, groups) in [("Course plan", &record.course_groups), ("Diet plan", &record.diet_groups)] {
        if groups.is_empty() {
            continue;
        }
        println!("{}", label.cyan());
        for group in groups {
            println!("  {}", group.title.bold());
            for item in &group.items {
                println!("    - {item}");
            }
        }
    }
}

fn print_products(products: &[Product]) {
    if products.is_empty() {
        println!("No products found. Add one with 'gym products add <name> -q <qty> -p <price>'");
        return;
    }
    for p in products {
        let quantity = if p.quantity == 0 {
            "out of stock".red().to_string()
        } else {
            format!("{} in stock", p.quantity)
        };
        println!(
            "  {}  {:<28} {:>10.2}  {}",
            listed_id(&p.id).dimmed(),
            p.name,
            p.price,
            quantity
        );
    }
}

fn print_inventory_summary(summary: &InventorySummary) {
    println!();
    println!("Stock value:   {:.2}", summary.stock_value);
    println!("Sales revenue: {:.2}", summary.sales_revenue);
    if !summary.low_stock.is_empty() {
        let names: Vec<_> = summary
            .low_stock
            .iter()
            .map(|p| format!("{} ({})", p.name, p.quantity))
            .collect();
        println!(
            "{} {}",
            format!("Low stock (<= {LOW_STOCK_THRESHOLD}):").yellow(),
            names.join(", ")
        );
    }
}

fn print_sales(sales: &[Sale]) {
    if sales.is_empty() {
        println!("No sales recorded");
        return;
    }
    for s in sales {
        println!(
            "  {}  {}  {:<20} {:>3} x {:<24} {:>10.2}",
            listed_id(&s.id).dimmed(),
            s.created_at.format("%Y-%m-%d %H:%M"),
            s.buyer_name,
            s.quantity,
            s.product_name,
            s.total_price
        );
    }
}

fn print_invoice(sale: &Sale) {
    println!("{}", "INVOICE".bold());
    println!("  number:   {}", sale.id);
    println!("  date:     {}", sale.created_at.format("%Y-%m-%d %H:%M"));
    println!("  buyer:    {}", sale.buyer_name);
    println!("  product:  {}", sale.product_name);
    println!("  quantity: {}", sale.quantity);
    println!("  unit:     {:.2}", sale.unit_price);
    println!("  {}    {:.2}", "total:".bold(), sale.total_price);
    if let Some(notes) = &sale.notes {
        println!("  notes:    {notes}");
    }
}

fn print_catalog(items: &[CatalogItem]) {
    if items.is_empty() {
        println!("Catalog is empty");
        return;
    }
    for item in items {
        match &item.description {
            Some(d) => println!("  {}  {} ({})", listed_id(&item.id).dimmed(), item.name, d.dimmed()),
            None => println!("  {}  {}", listed_id(&item.id).dimmed(), item.name),
        }
    }
}

pub async fn members(data: &DataAccess, cmd: MemberCommands, json: bool) -> Result<()> {
    match cmd {
        MemberCommands::List => {
            let members = data.get_subscribers()?;
            if json {
                return print_json(&members);
            }
            print_members(&members);
        }
        MemberCommands::Show { id } => {
            let record = data.get_subscriber_with_groups(id)?;
            if json {
                return print_json(&record);
            }
            print_member_card(&record);
        }
        MemberCommands::Add(args) => {
            let record = data.save_subscriber(member_form(args)).await?;
            if json {
                return print_json(&record);
            }
            println!("{} {}", "Registered".green(), record.subscriber.name);
        }
        MemberCommands::Update { id, member } => {
            let record = data.update_subscriber(id, member_form(member)).await?;
            if json {
                return print_json(&record);
            }
            println!("{} {}", "Updated".green(), record.subscriber.name);
        }
        MemberCommands::Remove { id } => {
            data.delete_subscriber(id).await?;
            if !json {
                println!("{} subscriber {}", "Deleted".yellow(), id);
            }
        }
        MemberCommands::Search { term } => {
            let members = data.search_subscribers(&term)?;
            if json {
                return print_json(&members);
            }
            print_members(&members);
        }
    }
    Ok(())
}

pub async fn products(data: &DataAccess, cmd: ProductCommands, json: bool) -> Result<()> {
    match cmd {
        ProductCommands::List => {
            let products = data.get_products()?;
            if json {
                return print_json(&products);
            }
            print_products(&products);
            if !products.is_empty() {
                print_inventory_summary(&data.inventory_summary()?);
            }
        }
        ProductCommands::Show { id } => {
            let product = data.get_product(id)?;
            if json {
                return print_json(&product);
            }
            print_products(std::slice::from_ref(&product));
            if let Some(description) = &product.description {
                println!("    {description}");
            }
        }
        ProductCommands::Add(args) => {
            let product = data.save_product(product_form(args)).await?;
            if json {
                return print_json(&product);
            }
            println!("{} {} ({})", "Added".green(), product.name, product.id);
        }
        ProductCommands::Update { id, product } => {
            let product = data.update_product(id, product_form(product)).await?;
            if json {
                return print_json(&product);
            }
            println!("{} {}", "Updated".green(), product.name);
        }
        ProductCommands::Remove { id } => {
            data.delete_product(id).await?;
            if !json {
                println!("{} product {}", "Deleted".yellow(), id);
            }
        }
        ProductCommands::Search { term } => {
            let products = data.search_products(&term)?;
            if json {
                return print_json(&products);
            }
            print_products(&products);
        }
    }
    Ok(())
}

pub async fn sales(data: &DataAccess, cmd: SaleCommands, json: bool) -> Result<()> {
    match cmd {
        SaleCommands::List => {
            let sales = data.get_sales()?;
            if json {
                return print_json(&sales);
            }
            print_sales(&sales);
        }
        SaleCommands::Show { id } => {
            let sale = data.get_sale(id)?;
            if json {
                return print_json(&sale);
            }
            print_invoice(&sale);
        }
        SaleCommands::Add {
            buyer,
            product,
            quantity,
            notes,
        } => {
            let sale = data
                .save_sale(SaleForm {
                    buyer_name: buyer,
                    product_id: product,
                    quantity,
                    notes,
                })
                .await?;
            if json {
                return print_json(&sale);
            }
            println!(
                "{} {} x {} to {} for {:.2}",
                "Sold".green(),
                sale.quantity,
                sale.product_name,
                sale.buyer_name,
                sale.total_price
            );
        }
        SaleCommands::Remove { id } => {
            let sale = data.delete_sale(id).await?;
            if !json {
                println!(
                    "{} sale {}, {} x {} back in stock",
                    "Deleted".yellow(),
                    id,
                    sale.quantity,
                    sale.product_name
                );
            }
        }
        SaleCommands::Search { term } => {
            let sales = data.search_sales(&term)?;
            if json {
                return print_json(&sales);
            }
            print_sales(&sales);
        }
    }
    Ok(())
}

pub async fn catalog(
    data: &DataAccess,
    kind: CatalogKind,
    cmd: CatalogCommands,
    json: bool,
) -> Result<()> {
    match cmd {
        CatalogCommands::List => {
            let items = match kind {
                CatalogKind::CoursePoints => data.get_course_points()?,
                CatalogKind::DietItems => data.get_diet_items()?,
            };
            if json {
                return print_json(&items);
            }
            print_catalog(&items);
        }
        CatalogCommands::Add { name, description } => {
            let item = data
                .save_catalog_item(kind, CatalogForm { name, description })
                .await?;
            if json {
                return print_json(&item);
            }
            println!("{} {}", "Added".green(), item.name);
        }
        CatalogCommands::Update {
            id,
            name,
            description,
        } => {
            let item = data
                .update_catalog_item(kind, id, CatalogForm { name, description })
                .await?;
            if json {
                return print_json(&item);
            }
            println!("{} {}", "Updated".green(), item.name);
        }
        CatalogCommands::Remove { id } => {
            data.delete_catalog_item(kind, id).await?;
            if !json {
                println!("{} {}", "Deleted".yellow(), id);
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct StatusReport {
    online: bool,
    local_only: bool,
    pending_operations: u64,
    last_sync: Option<chrono::DateTime<chrono::Utc>>,
    database: gym_core::DatabaseStatus,
    inventory: InventorySummary,
}

pub fn status(data: &DataAccess, json: bool) -> Result<()> {
    let report = StatusReport {
        online: data.is_online(),
        local_only: data.is_local_only(),
        pending_operations: data.get_pending_operations_count()?,
        last_sync: data.get_last_sync_time()?,
        database: data.check_database_initialization()?,
        inventory: data.inventory_summary()?,
    };
    if json {
        return print_json(&report);
    }

    let connection = if report.local_only {
        "local only".yellow()
    } else if report.online {
        "online".green()
    } else {
        "offline".red()
    };
    println!("Connection:  {connection}");
    let pending = report.pending_operations.to_string();
    println!(
        "Pending:     {}",
        if report.pending_operations > 0 { pending.yellow() } else { pending.normal() }
    );
    match report.last_sync {
        Some(at) => println!("Last sync:   {}", at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")),
        None => println!("Last sync:   never"),
    }
    let counts = report.database.counts;
    println!(
        "Records:     {} subscribers, {} products, {} sales, {} course points, {} diet items",
        counts.subscribers, counts.products, counts.sales, counts.course_points, counts.diet_items
    );
    println!(
        "Inventory:   {:.2} in stock, {:.2} sold, {} low on stock",
        report.inventory.stock_value,
        report.inventory.sales_revenue,
        report.inventory.low_stock.len()
    );
    Ok(())
}

pub async fn sync(data: &DataAccess, pending: bool, json: bool) -> Result<()> {
    if pending {
        let ops = data.pending_operations()?;
        if json {
            return print_json(&ops);
        }
        if ops.is_empty() {
            println!("Nothing queued");
        }
        for op in ops {
            println!(
                "  #{:<5} {:<7} {:<13} {}  {}",
                op.seq,
                op.kind.as_str(),
                op.entity.as_str(),
                op.entity_id,
                op.queued_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
            );
        }
        return Ok(());
    }

    let report = data.force_sync_with_server().await?;
    if json {
        return print_json(&report);
    }
    if report.is_complete() {
        println!(
            "{} {} operation(s) replayed",
            "Synced:".green(),
            report.replayed
        );
    } else {
        println!(
            "{} {} replayed, {} still queued ({})",
            "Sync incomplete:".yellow(),
            report.replayed,
            report.remaining,
            report.failure.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

pub fn backup(data: &DataAccess, dir: &Path, json: bool) -> Result<()> {
    let path = data
        .write_backup(dir)
        .with_context(|| format!("Failed to write backup into {}", dir.display()))?;
    if json {
        return print_json(&serde_json::json!({ "path": path }));
    }
    println!("{} {}", "Backup written to".green(), path.display());
    Ok(())
}

pub async fn init(data: &DataAccess, sample: bool, json: bool) -> Result<()> {
    let seeded = if sample {
        Some(data.initialize_database_with_sample_data().await?)
    } else {
        None
    };
    let status = data.check_database_initialization()?;
    if json {
        return print_json(&serde_json::json!({ "status": status, "seeded": seeded }));
    }
    if status.is_initialized {
        println!("{}", "Database ready".green());
    } else {
        println!("{}", "Database schema incomplete".red());
    }
    if let Some(seeded) = seeded {
        if seeded.is_empty() {
            println!("Sample data skipped, collections already have entries");
        } else {
            println!(
                "Added {} course points, {} diet items, {} products",
                seeded.course_points, seeded.diet_items, seeded.products
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listed_ids_are_accepted_back() {
        use crate::cli::{Cli, Commands};
        use clap::Parser;

        let id = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        let listed = listed_id(&id);
        assert_eq!(listed, "67e55044-10b1-426f-9247-bb680e5fe0c8");

        let cli = Cli::try_parse_from(["gym", "products", "rm", listed.as_str()]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Products(ProductCommands::Remove { id: parsed }) if parsed == id
        ));
        let cli = Cli::try_parse_from(["gym", "sales", "show", listed.as_str()]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Sales(SaleCommands::Show { id: parsed }) if parsed == id
        ));
    }

    #[test]
    fn member_args_map_onto_form() {
        let form = member_form(MemberArgs {
            name: "Hana".into(),
            age: Some(31),
            weight: None,
            height: Some(170.0),
            phone: None,
            notes: None,
            course_groups: vec![crate::cli::parse_group("Legs: Squat").unwrap()],
            diet_groups: vec![],
        });
        assert_eq!(form.name, "Hana");
        assert_eq!(form.height, Some(170.0));
        assert_eq!(form.course_groups[0].items, ["Squat"]);
        assert!(form.validate().is_ok());
    }
}
