//! Terminal demo of the data grid
//!
//! Mounts a pagination grid over a simulated remote collection and an
//! infinite-scroll grid over an in-memory array, then prints what a host
//! would render after a few interactions. Pass a grid configuration file to
//! use its columns instead of the sample ones.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dg_core::{ColumnSort, DataSource, FilterValue, GridEventKind};
use dg_data::{ArraySource, EntityElement, EntitySelection, GridConfig, Variant};
use dg_views::{
    build_preview, DataGrid, FileStore, GridSources, HeaderCell, KeyValueStore, Preview,
    RenderedRow,
};

mod sample;

fn print_table(title: &str, header: &[HeaderCell], rows: &[RenderedRow], footer: Option<&str>) {
    println!("\n== {title}");
    let titles: Vec<String> = header
        .iter()
        .map(|h| match h.sort {
            Some(true) => format!("{} v", h.title),
            Some(false) => format!("{} ^", h.title),
            None => h.title.clone(),
        })
        .collect();
    println!("   {}", titles.join(" | "));
    for row in rows {
        let marker = if row.selected { ">" } else { " " };
        println!("{marker}  {}", row.cells.join(" | "));
    }
    if let Some(footer) = footer {
        println!("   {footer}");
    }
}

fn print_preview(config: &GridConfig) {
    match build_preview(config, true) {
        Preview::Placeholder(message) => println!("\n== preview: {message}"),
        Preview::Table { header, rows } => {
            println!("\n== preview ({} rows)", rows.len());
            println!("   {}", header.join(" | "));
        }
    }
}

async fn pagination_demo(config: GridConfig, store: Arc<FileStore>) -> Result<()> {
    let collection = Arc::new(
        EntitySelection::new("Readings", sample::sensor_readings(95))
            .with_key("id")
            .with_latency(Duration::from_millis(5)),
    );
    let current = Arc::new(EntityElement::new("reading"));
    let sources = GridSources {
        datasource: Some(collection.clone() as Arc<dyn DataSource>),
        current_element: Some(current.clone() as Arc<dyn DataSource>),
        store: Some(store as Arc<dyn KeyValueStore>),
        ..GridSources::default()
    };

    let grid = DataGrid::mount("readings-paged", config, sources).await;
    grid.events().subscribe_all(|event| {
        info!(event = %event.kind, row = ?event.payload.row, "grid event");
    });
    let Some(paged) = grid.pagination() else {
        anyhow::bail!("pagination grid did not mount: {:?}", grid.view().placeholder());
    };

    let show = |title: &str| {
        let s = paged.snapshot();
        print_table(
            &format!("{title} (page {}/{})", s.page, s.page_count),
            &s.header,
            &s.rows,
            s.footer.as_deref(),
        );
    };

    show("first page");
    paged.last_page().await;
    show("last page");

    let row = collection.row(37).context("row 37 exists")?;
    current.set_entity(Some(37), row);
    paged.settled().await;
    show("following the current element");

    paged.set_sorting(vec![ColumnSort::desc("temperature")]).await;
    show("hottest first");

    paged
        .set_filter("sensor.id", Some(FilterValue::Text { value: "north".into() }))
        .await;
    show("north sensors");

    paged.click_row(2).await?;
    paged.click_row(2).await?;
    grid.teardown();
    Ok(())
}

async fn infinite_demo(config: GridConfig) -> Result<()> {
    let source = Arc::new(ArraySource::new("readings", sample::sensor_readings(500)));
    let grid = DataGrid::mount(
        "readings-scroll",
        config,
        GridSources::with_datasource(source.clone() as Arc<dyn DataSource>),
    )
    .await;
    let Some(scroll) = grid.infinite() else {
        anyhow::bail!("infinite grid did not mount: {:?}", grid.view().placeholder());
    };

    let mut offset = 0.0;
    for _ in 0..4 {
        offset += 300.0;
        scroll.scroll_to(offset);
        tokio::time::sleep(Duration::from_millis(80)).await;
        info!(offset, loaded = scroll.loaded(), total = scroll.total(), "scrolled");
    }
    let s = scroll.snapshot();
    print_table("scrolled", &s.header, &s.rows, s.footer.as_deref());

    scroll.emit(GridEventKind::KeyDown, Default::default());
    scroll.set_column_visible("humidity", false).await;
    let s = scroll.snapshot();
    print_table("humidity hidden", &s.header, &s.rows[..s.rows.len().min(5)], None);

    grid.teardown();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let base = match std::env::args().nth(1) {
        Some(path) => GridConfig::load(&path)
            .with_context(|| format!("failed to load grid config {path}"))?,
        None => sample::sample_config(Variant::Pagination),
    };
    info!(columns = base.columns.len(), "starting data grid demo");

    let state_dir = std::env::temp_dir().join("datagrid-demo");
    let store = Arc::new(FileStore::open(&state_dir)?);

    let paged = GridConfig {
        variant: Variant::Pagination,
        ..base.clone()
    };
    let infinite = GridConfig {
        variant: Variant::Infinite,
        ..base
    };

    print_preview(&paged);
    print_preview(&infinite);
    pagination_demo(paged, store).await?;
    infinite_demo(infinite).await?;

    info!(state_dir = %state_dir.display(), "done");
    Ok(())
}
