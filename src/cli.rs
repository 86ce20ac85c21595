use crate::catalog::models::{FilterCriteria, GeoPoint, RangeFilter, SortOrder};
use clap::{Parser, Subcommand, ValueEnum};

/// Browse the tour catalog from the command line.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Log formatter to use
    #[arg(long, value_enum, default_value_t = default_tracing_format())]
    pub tracing: TracingFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List one page of tours
    List(ListArgs),
    /// Show a single tour by slug
    Tour { slug: String },
    /// Show a single agency by id
    Agency { id: u64 },
}

#[derive(clap::Args, Debug, Default)]
pub struct ListArgs {
    /// Free-text query
    #[arg(short, long)]
    pub query: Option<String>,
    #[arg(short, long)]
    pub category: Option<String>,
    /// Destination filter, repeatable (country name, code, city or tag)
    #[arg(short, long = "destination")]
    pub destinations: Vec<String>,
    #[arg(long)]
    pub min_days: Option<u32>,
    #[arg(long)]
    pub max_days: Option<u32>,
    #[arg(long)]
    pub min_price: Option<f64>,
    #[arg(long)]
    pub max_price: Option<f64>,
    /// Sort order, e.g. `latest`, `price-asc`, `popular`
    #[arg(short, long, default_value_t = SortOrder::Latest)]
    pub sort: SortOrder,
    #[arg(short, long, default_value_t = 1)]
    pub page: u32,
    /// Search near this latitude (requires --lng)
    #[arg(long, requires = "lng", allow_negative_numbers = true)]
    pub lat: Option<f64>,
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    pub lng: Option<f64>,
}

impl ListArgs {
    pub fn criteria(&self) -> FilterCriteria {
        FilterCriteria {
            text_query: self.query.clone(),
            category: self.category.clone(),
            destinations: self.destinations.iter().cloned().collect(),
            duration: range(self.min_days, self.max_days, u32::MAX),
            price: range(self.min_price, self.max_price, f64::MAX),
            sort_order: self.sort,
            location: self.lat.zip(self.lng).map(|(lat, lng)| GeoPoint { lat, lng }),
        }
    }
}

/// A range enabled by either bound; the missing side is left open.
fn range<T: Copy + PartialOrd + Default>(min: Option<T>, max: Option<T>, open: T) -> RangeFilter<T> {
    if min.is_none() && max.is_none() {
        return RangeFilter::default();
    }
    RangeFilter::between(min.unwrap_or_default(), max.unwrap_or(open))
}

/// Formatter type for log output
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TracingFormat {
    /// Use pretty formatter (default in debug mode)
    Pretty,
    /// Use JSON formatter (default in release mode)
    Json,
}

fn default_tracing_format() -> TracingFormat {
    if cfg!(debug_assertions) {
        TracingFormat::Pretty
    } else {
        TracingFormat::Json
    }
}

impl std::fmt::Display for TracingFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TracingFormat::Pretty => f.write_str("pretty"),
            TracingFormat::Json => f.write_str("json"),
        }
    }
}
