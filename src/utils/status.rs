use crate::models::layer::Layer;
use comfy_table::{Attribute, Cell, CellAlignment, Table};

/// Outcome of one count query, as printed by the `count` command.
pub struct CountRow {
    pub layer: Layer,
    pub count: Result<u64, String>,
}

fn header(title: &str) -> Cell {
    Cell::new(title)
        .add_attribute(Attribute::Bold)
        .set_alignment(CellAlignment::Center)
}

pub fn count_table(rows: &[CountRow], ceiling: u64) -> Table {
    let mut table = Table::new();
    table
        .set_header(vec![
            header(""),
            header("Layer"),
            header("Title"),
            header("Features"),
        ])
        .load_preset(comfy_table::presets::ASCII_BORDERS_ONLY_CONDENSED);

    for row in rows {
        let (mark, count) = match &row.count {
            Ok(count) if *count > ceiling => ("⚠️", count.to_string()),
            Ok(count) => ("✅", count.to_string()),
            Err(_) => ("❌", "unknown".to_string()),
        };
        table.add_row(vec![
            Cell::new(mark).set_alignment(CellAlignment::Center),
            Cell::new(row.layer.id()),
            Cell::new(&row.layer.title),
            Cell::new(count).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

pub fn print_count_summary(rows: &[CountRow], ceiling: u64) {
    println!("\nFeature counts:\n{}", count_table(rows, ceiling));

    let over: Vec<&CountRow> = rows
        .iter()
        .filter(|r| matches!(r.count, Ok(c) if c > ceiling))
        .collect();
    let failed: Vec<(&CountRow, &String)> = rows
        .iter()
        .filter_map(|r| r.count.as_ref().err().map(|e| (r, e)))
        .collect();

    if !over.is_empty() || !failed.is_empty() {
        println!("\nWarnings:");
        for row in over {
            println!(
                "  ⚠️{}: more than {} features, export would be refused",
                row.layer.id(),
                ceiling
            );
        }
        for (row, error) in failed {
            println!("  ❌{}: {}", row.layer.id(), error);
        }
    }
    println!();
}
