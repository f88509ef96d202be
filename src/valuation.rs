//! Turns canonical payloads into per-holding figures and portfolio totals.
//!
//! Every figure is an `Option<f64>`: `None` means "no data" and is never
//! confused with zero. Totals are sums of the per-holding figures with
//! missing ones counting as zero, and total percentages are computed from
//! those sums.

use chrono::NaiveDate;
use comfy_table::{
    presets::UTF8_FULL, Attribute, Cell, CellAlignment, ContentArrangement, Table,
};
use futures::future::join_all;
use tracing::warn;

use crate::adapter::AdapterRegistry;
use crate::canonical::{CanonicalEntry, CanonicalPayload};
use crate::error::NavError;
use crate::format::{
    date_short, fmt_amount, fmt_pct, fmt_round_up, fmt_unit, month_label_short, profit_color,
    title_case,
};
use crate::nearest::{find_nearest, latest_date, month_targets, MONTHS_BACK};
use crate::normalize::{format_dmy, parse_nav};
use crate::scheme::Scheme;

/// A NAV reading and what the holding was worth at it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PricePoint {
    pub date: Option<String>,
    pub nav: Option<f64>,
    pub market_value: Option<f64>,
}

/// The holding's value at the entry nearest one of the month targets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthValue {
    pub date: Option<String>,
    pub market_value: Option<f64>,
    pub profit: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValuationRow {
    pub scheme_code: u32,
    pub scheme_name: String,
    pub principal: f64,
    pub unit: f64,
    pub nav: Option<f64>,
    pub market_value: Option<f64>,
    pub profit: Option<f64>,
    pub prev_delta: Option<f64>,
    pub previous: PricePoint,
    pub months: [MonthValue; MONTHS_BACK],
    pub entries: Vec<CanonicalEntry>,
    pub latest_date: Option<String>,
}

fn ratio_pct(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d != 0.0 => Some(n / d * 100.0).filter(|p| p.is_finite()),
        _ => None,
    }
}

fn price_point(entry: Option<&CanonicalEntry>, unit: f64) -> PricePoint {
    let nav = entry.and_then(|e| e.nav.as_deref()).and_then(parse_nav);
    PricePoint {
        date: entry.and_then(|e| e.date.clone()),
        nav,
        market_value: nav.map(|n| n * unit).filter(|v| v.is_finite()),
    }
}

impl ValuationRow {
    pub fn profit_pct(&self) -> Option<f64> {
        ratio_pct(self.profit, Some(self.principal))
    }

    pub fn prev_delta_pct(&self) -> Option<f64> {
        ratio_pct(self.prev_delta, self.previous.market_value)
    }

    fn value_months(&mut self, targets: Option<[NaiveDate; MONTHS_BACK]>) {
        let Some(targets) = targets else {
            self.months = Default::default();
            return;
        };
        for (slot, target) in self.months.iter_mut().zip(targets) {
            *slot = match find_nearest(&self.entries, target) {
                Some(found) => {
                    let market_value = price_point(Some(found), self.unit).market_value;
                    MonthValue {
                        date: found.date.clone(),
                        market_value,
                        profit: market_value.map(|v| v - self.principal),
                    }
                }
                None => MonthValue::default(),
            };
        }
    }
}

/// Value one holding from its fetch result.
///
/// A failed fetch still produces a row, named `Code <n>` and with every
/// figure missing. Month values are filled in by [`Snapshot::build`], which
/// knows the latest date across all holdings.
pub fn value_holding(scheme: &Scheme, fetched: Result<CanonicalPayload, NavError>) -> ValuationRow {
    let payload = match fetched {
        Ok(payload) => payload,
        Err(e) => {
            warn!(scheme_code = scheme.scheme_code, error = %e, "scheme data unavailable");
            CanonicalPayload::default()
        }
    };

    let current = price_point(payload.first(), scheme.unit);
    let previous = price_point(payload.entries.get(1), scheme.unit);
    let profit = current.market_value.map(|v| v - scheme.principal);
    let prev_delta = current
        .market_value
        .zip(previous.market_value)
        .map(|(now, before)| now - before);

    ValuationRow {
        scheme_code: scheme.scheme_code,
        scheme_name: payload
            .scheme_name()
            .map_or_else(|| scheme.placeholder_name(), str::to_string),
        principal: scheme.principal,
        unit: scheme.unit,
        nav: current.nav,
        market_value: current.market_value,
        profit,
        prev_delta,
        previous,
        months: Default::default(),
        latest_date: payload.first().and_then(|e| e.date.clone()),
        entries: payload.entries,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MonthTotal {
    pub market_value: f64,
    pub profit: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Totals {
    pub principal: f64,
    pub market_value: f64,
    pub profit: f64,
    pub prev_delta: f64,
    pub previous_market_value: f64,
    pub months: [MonthTotal; MONTHS_BACK],
}

impl Totals {
    fn add(&mut self, row: &ValuationRow) {
        self.principal += row.principal;
        self.market_value += row.market_value.unwrap_or(0.0);
        self.profit += row.profit.unwrap_or(0.0);
        self.prev_delta += row.prev_delta.unwrap_or(0.0);
        self.previous_market_value += row.previous.market_value.unwrap_or(0.0);
        for (total, month) in self.months.iter_mut().zip(&row.months) {
            total.market_value += month.market_value.unwrap_or(0.0);
            total.profit += month.profit.unwrap_or(0.0);
        }
    }

    pub fn profit_pct(&self) -> Option<f64> {
        ratio_pct(Some(self.profit), Some(self.principal))
    }

    pub fn prev_delta_pct(&self) -> Option<f64> {
        ratio_pct(Some(self.prev_delta), Some(self.previous_market_value))
    }
}

/// One refresh worth of rows and their totals.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub rows: Vec<ValuationRow>,
    pub latest_date: Option<NaiveDate>,
    pub month_targets: Option<[NaiveDate; MONTHS_BACK]>,
    pub totals: Totals,
}

impl Snapshot {
    pub fn build(mut rows: Vec<ValuationRow>) -> Snapshot {
        let latest = latest_date(rows.iter().filter_map(|row| row.latest_date.as_deref()));
        let targets = latest.map(month_targets);

        let mut totals = Totals::default();
        for row in &mut rows {
            row.value_months(targets);
            totals.add(row);
        }

        Snapshot {
            rows,
            latest_date: latest,
            month_targets: targets,
            totals,
        }
    }

    /// Rows by market value, largest first; rows without one go last.
    pub fn sorted_rows(&self) -> Vec<&ValuationRow> {
        let mut sorted: Vec<&ValuationRow> = self.rows.iter().collect();
        sorted.sort_by(|a, b| {
            let a = a.market_value.unwrap_or(f64::NEG_INFINITY);
            let b = b.market_value.unwrap_or(f64::NEG_INFINITY);
            b.total_cmp(&a)
        });
        sorted
    }

    fn month_labels(&self) -> [String; MONTHS_BACK] {
        match self.month_targets {
            Some(targets) => targets.map(|t| month_label_short(Some(&format_dmy(t)))),
            None => Default::default(),
        }
    }

    pub fn to_table(&self, include_sum: bool) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_width(160);

        let [m1, m2, m3] = self.month_labels();
        let mut header = vec![
            "Scheme".to_string(),
            "Units".to_string(),
            "NAV".to_string(),
            "As of".to_string(),
            "Invested".to_string(),
            "Value".to_string(),
            "P&L".to_string(),
            "%P&L".to_string(),
            "Day".to_string(),
            "%Day".to_string(),
        ];
        header.extend([m1, m2, m3].map(|label| format!("P&L {label}")));
        table.set_header(
            header
                .into_iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
        );

        for row in self.sorted_rows() {
            let mut cells = vec![
                Cell::new(title_case(&row.scheme_name)),
                right(fmt_unit(Some(row.unit))),
                right(fmt_amount(row.nav)),
                Cell::new(date_short(row.latest_date.as_deref())),
                right(fmt_round_up(Some(row.principal))),
                right(fmt_round_up(row.market_value)),
                signed(fmt_amount(row.profit), row.profit),
                signed(fmt_pct(row.profit_pct()), row.profit),
                signed(fmt_amount(row.prev_delta), row.prev_delta),
                signed(fmt_pct(row.prev_delta_pct()), row.prev_delta),
            ];
            cells.extend(
                row.months
                    .iter()
                    .map(|month| signed(fmt_round_up(month.profit), month.profit)),
            );
            table.add_row(cells);
        }

        if include_sum {
            let totals = &self.totals;
            let mut cells = vec![
                Cell::new("TOTAL").add_attribute(Attribute::Bold),
                Cell::new(""),
                Cell::new(""),
                Cell::new(date_short(self.latest_date.map(format_dmy).as_deref())),
                right(fmt_round_up(Some(totals.principal))).add_attribute(Attribute::Bold),
                right(fmt_round_up(Some(totals.market_value))).add_attribute(Attribute::Bold),
                signed(fmt_amount(Some(totals.profit)), Some(totals.profit))
                    .add_attribute(Attribute::Bold),
                signed(fmt_pct(totals.profit_pct()), Some(totals.profit))
                    .add_attribute(Attribute::Bold),
                signed(fmt_amount(Some(totals.prev_delta)), Some(totals.prev_delta))
                    .add_attribute(Attribute::Bold),
                signed(fmt_pct(totals.prev_delta_pct()), Some(totals.prev_delta))
                    .add_attribute(Attribute::Bold),
            ];
            cells.extend(totals.months.iter().map(|month| {
                signed(fmt_round_up(Some(month.profit)), Some(month.profit))
                    .add_attribute(Attribute::Bold)
            }));
            table.add_row(cells);
        }

        table
    }

    // Print the snapshot as a table
    pub fn print(&self, include_sum: bool) {
        println!("{}", self.to_table(include_sum));
    }
}

fn right(text: String) -> Cell {
    Cell::new(text).set_alignment(CellAlignment::Right)
}

fn signed(text: String, value: Option<f64>) -> Cell {
    let cell = right(text);
    match profit_color(value) {
        Some(color) => cell.fg(color),
        None => cell,
    }
}

/// Fetch every scheme through `adapter` concurrently and value the results.
///
/// One scheme failing does not affect the others; it shows up as a
/// placeholder row. Only an unknown adapter name fails the whole load.
pub async fn load_snapshot(
    registry: &AdapterRegistry,
    adapter: &str,
    schemes: &[Scheme],
) -> Result<Snapshot, NavError> {
    let adapter = registry.get(adapter)?;
    let results = join_all(schemes.iter().map(|scheme| adapter.fetch(scheme))).await;

    let rows = schemes
        .iter()
        .zip(results)
        .map(|(scheme, fetched)| value_holding(scheme, fetched))
        .collect();
    Ok(Snapshot::build(rows))
}
