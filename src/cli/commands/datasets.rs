//! Datasets command - list what a project can contain

use crate::cli::args::{DatasetsArgs, OutputFormat};
use crate::config::Config;
use crate::error::BasinResult;
use crate::manifest::{DatasetDescriptor, Registry};

/// A registry entry flattened for display; layers carry their package path
struct Row {
    id: &'static str,
    name: &'static str,
    category: String,
    path: String,
    parent: Option<&'static str>,
}

/// Execute the datasets command
pub async fn execute(args: DatasetsArgs, config: &Config) -> BasinResult<()> {
    let mut registry = Registry::builtin()?;
    if let Some(path) = &config.general.layer_descriptions {
        registry = registry.with_descriptions(path).await?;
    }
    let rows = rows(registry.datasets());

    match args.format {
        OutputFormat::Table => print_table(&rows, &registry),
        OutputFormat::Json => print_json(&rows, &registry)?,
        OutputFormat::Plain => {
            for row in &rows {
                println!("{}", row.id);
            }
        }
    }

    Ok(())
}

fn rows(datasets: &'static [DatasetDescriptor]) -> Vec<Row> {
    let mut rows = Vec::new();
    for dataset in datasets {
        rows.push(Row {
            id: dataset.id,
            name: dataset.name,
            category: dataset.category.to_string(),
            path: dataset.path.to_string(),
            parent: None,
        });
        for layer in dataset.children {
            rows.push(Row {
                id: layer.id,
                name: layer.name,
                category: layer.category.to_string(),
                path: format!("{}/{}", dataset.path, layer.path),
                parent: Some(dataset.id),
            });
        }
    }
    rows
}

fn print_table(rows: &[Row], registry: &Registry) {
    println!("{:<26} {:<34} {:<8} {:<40}", "ID", "NAME", "TYPE", "PATH");
    println!("{}", "-".repeat(110));

    for row in rows {
        let id = match row.parent {
            Some(_) => format!("  {}", row.id),
            None => row.id.to_string(),
        };
        let marker = if registry.description(row.id).is_some() { "" } else { " *" };
        println!(
            "{:<26} {:<34} {:<8} {:<40}",
            id,
            format!("{}{}", row.name, marker),
            row.category,
            row.path
        );
    }

    println!();
    println!("Total: {} dataset(s); * = no layer description", rows.len());
}

fn print_json(rows: &[Row], registry: &Registry) -> BasinResult<()> {
    #[derive(serde::Serialize)]
    struct DatasetJson<'a> {
        id: &'a str,
        name: &'a str,
        category: &'a str,
        path: &'a str,
        parent: Option<&'a str>,
        description: Option<&'a str>,
        source_url: Option<&'a str>,
    }

    let datasets: Vec<DatasetJson> = rows
        .iter()
        .map(|row| {
            let described = registry.description(row.id);
            DatasetJson {
                id: row.id,
                name: row.name,
                category: &row.category,
                path: &row.path,
                parent: row.parent,
                description: described.map(|d| d.description.as_str()),
                source_url: described.map(|d| d.source_url.as_str()),
            }
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&datasets)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layers_follow_their_package() {
        let registry = Registry::builtin().unwrap();
        let rows = rows(registry.datasets());

        let hydrology = rows.iter().position(|r| r.id == "HYDROLOGY").unwrap();
        let flowline = rows.iter().position(|r| r.id == "NHDFlowline").unwrap();
        assert!(flowline > hydrology);
        assert_eq!(rows[flowline].parent, Some("HYDROLOGY"));
        assert!(rows[flowline].path.starts_with(rows[hydrology].path.as_str()));
        assert!(rows.iter().any(|r| r.id == "DEM" && r.parent.is_none()));
    }
}
