//! Datasource management: list, upload rows, link an integration query, delete

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tabled::Tabled;

use crate::client::{ApiClient, DatasourceInfo, RowData};
use crate::output::{format_timestamp, print_success, print_table, OutputFormat};

#[derive(Tabled, Serialize)]
struct DatasourceRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Rows")]
    row_count: usize,
    #[tabled(rename = "Location")]
    location: String,
    #[tabled(rename = "Saved")]
    saved_at: String,
}

impl From<DatasourceInfo> for DatasourceRow {
    fn from(info: DatasourceInfo) -> Self {
        Self {
            name: info.name,
            kind: info.kind,
            row_count: info.row_count,
            location: info.location,
            saved_at: format_timestamp(&info.saved_at),
        }
    }
}

/// Read a `{"columns": [...], "rows": [[...], ...]}` file
pub fn read_rows(path: &Path) -> Result<RowData> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let data: RowData = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    if data.columns.is_empty() {
        bail!("{} has no columns", path.display());
    }
    if let Some((i, row)) = data
        .rows
        .iter()
        .enumerate()
        .find(|(_, row)| row.len() != data.columns.len())
    {
        bail!(
            "row {} has {} values, expected {}",
            i,
            row.len(),
            data.columns.len()
        );
    }
    Ok(data)
}

pub async fn list(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let rows: Vec<DatasourceRow> = client
        .datasources()
        .await?
        .into_iter()
        .map(DatasourceRow::from)
        .collect();
    print_table(&rows, format);
    Ok(())
}

pub async fn upload(client: &ApiClient, name: &str, file: &Path, format: OutputFormat) -> Result<()> {
    let data = read_rows(file)?;
    let info = client.save_datasource(name, data).await?;
    report(info, "Saved", format)
}

pub async fn link(
    client: &ApiClient,
    name: &str,
    integration: &str,
    query: &str,
    format: OutputFormat,
) -> Result<()> {
    let info = client.link_datasource(name, integration, query).await?;
    report(info, "Linked", format)
}

pub async fn delete(client: &ApiClient, name: &str, format: OutputFormat) -> Result<()> {
    let info = client.delete_datasource(name).await?;
    report(info, "Deleted", format)
}

fn report(info: DatasourceInfo, verb: &str, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&info)?),
        OutputFormat::Table => print_success(&format!(
            "{} datasource {} ({} rows)",
            verb, info.name, info.row_count
        )),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_read_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cars.json");
        std::fs::write(
            &path,
            r#"{"columns": ["model", "price"], "rows": [["Fiesta", 8000], ["Focus", 11000.5]]}"#,
        )
        .unwrap();

        let data = read_rows(&path).unwrap();
        assert_eq!(data.columns, vec!["model", "price"]);
        assert_eq!(data.rows[1], vec![json!("Focus"), json!(11000.5)]);
    }

    #[test]
    fn test_read_rows_rejects_ragged_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"columns": ["a", "b"], "rows": [[1]]}"#).unwrap();
        assert!(read_rows(&path).is_err());

        std::fs::write(&path, r#"{"columns": [], "rows": []}"#).unwrap();
        assert!(read_rows(&path).is_err());

        assert!(read_rows(&dir.path().join("missing.json")).is_err());
    }
}
