//! HTML parsers for the registry's property pages
//!
//! The registry's markup is not self-describing, so every field is read from
//! a fixed position under a fixed selector. The schemas below are the single
//! source of truth for that mapping.
//!
//! # Property page (`table.hs_table`)
//!
//! Each `tr` holds a `th` label and a `td` value.
//!
//! | Row | Field |
//! |-----|-------|
//! | 0 | name |
//! | 1 | address |
//! | 2 | developer |
//! | 3 | presale license (optional) |
//! | 4 | district (optional) |
//! | 5.. | metadata as (label, value) |
//!
//! # Building list (`table.hs_xqxx tbody tr`)
//!
//! | Cell | Field |
//! |------|-------|
//! | 0 | `<a href=".../{building_id}">{name}</a>` |
//! | 1 | floor count |
//!
//! # Unit page (`table.hs_table tbody tr`)
//!
//! | Cell | Field |
//! |------|-------|
//! | 0 | unit id (room number) |
//! | 1 | built area, e.g. `89.50㎡` |
//! | 2 | sale status |

use crate::storage::{Building, Property, Unit};
use crate::{FetchError, FetchResult, FetchTarget};
use scraper::{ElementRef, Html, Selector};

const PROPERTY_ROWS: &str = "table.hs_table tr";
const BUILDING_TABLE: &str = "table.hs_xqxx";
const BUILDING_ROWS: &str = "table.hs_xqxx tbody tr";
const UNIT_TABLE: &str = "table.hs_table";
const UNIT_ROWS: &str = "table.hs_table tbody tr";

const PROPERTY_NAME_ROW: usize = 0;
const PROPERTY_ADDRESS_ROW: usize = 1;
const PROPERTY_DEVELOPER_ROW: usize = 2;
const PROPERTY_LICENSE_ROW: usize = 3;
const PROPERTY_DISTRICT_ROW: usize = 4;
const PROPERTY_REQUIRED_ROWS: usize = 3;

const BUILDING_LINK_CELL: usize = 0;
const BUILDING_FLOORS_CELL: usize = 1;

const UNIT_ID_CELL: usize = 0;
const UNIT_AREA_CELL: usize = 1;
const UNIT_STATUS_CELL: usize = 2;
const UNIT_CELLS: usize = 3;

/// Parses a property page
///
/// # Arguments
///
/// * `html` - The page body
/// * `property_id` - The id the page was requested for
///
/// # Returns
///
/// * `Ok(Property)` - The parsed record
/// * `Err(FetchError::Parse)` - The table is missing or too short
pub fn parse_property(html: &str, property_id: &str) -> FetchResult<Property> {
    let target = FetchTarget::Property {
        property_id: property_id.to_string(),
    };
    let document = Html::parse_document(html);
    let row_selector = selector(PROPERTY_ROWS, &target)?;
    let label_selector = selector("th", &target)?;
    let value_selector = selector("td", &target)?;

    let rows: Vec<(String, String)> = document
        .select(&row_selector)
        .map(|row| {
            let label = first_text(&row, &label_selector).unwrap_or_default();
            let value = first_text(&row, &value_selector).unwrap_or_default();
            (label, value)
        })
        .collect();

    if rows.len() < PROPERTY_REQUIRED_ROWS {
        return Err(FetchError::parse(
            target,
            format!(
                "expected at least {} rows in {}, found {}",
                PROPERTY_REQUIRED_ROWS,
                PROPERTY_ROWS,
                rows.len()
            ),
        ));
    }

    let value = |index: usize| rows.get(index).map(|(_, v)| v.clone());
    let optional = |index: usize| value(index).filter(|v| !v.is_empty());

    let name = value(PROPERTY_NAME_ROW).unwrap_or_default();
    if name.is_empty() {
        return Err(FetchError::parse(target, "property name is empty"));
    }

    Ok(Property {
        id: property_id.to_string(),
        name,
        address: value(PROPERTY_ADDRESS_ROW).unwrap_or_default(),
        developer: value(PROPERTY_DEVELOPER_ROW).unwrap_or_default(),
        presale_license: optional(PROPERTY_LICENSE_ROW),
        district: optional(PROPERTY_DISTRICT_ROW),
        metadata: rows.iter().skip(PROPERTY_DISTRICT_ROW + 1).cloned().collect(),
    })
}

/// Parses a building-list page
///
/// A present table with no data rows yields an empty list; a missing table is
/// a parse error.
pub fn parse_building_list(html: &str, property_id: &str) -> FetchResult<Vec<Building>> {
    let target = FetchTarget::BuildingList {
        property_id: property_id.to_string(),
    };
    let document = Html::parse_document(html);

    if document.select(&selector(BUILDING_TABLE, &target)?).next().is_none() {
        return Err(FetchError::parse(
            target,
            format!("{} not found", BUILDING_TABLE),
        ));
    }

    let row_selector = selector(BUILDING_ROWS, &target)?;
    let cell_selector = selector("td", &target)?;
    let link_selector = selector("a[href]", &target)?;
    let mut buildings = Vec::new();

    for (index, row) in document.select(&row_selector).enumerate() {
        let cells: Vec<ElementRef> = row.select(&cell_selector).collect();
        if cells.is_empty() {
            continue; // header row
        }

        let link = cells
            .get(BUILDING_LINK_CELL)
            .and_then(|cell| cell.select(&link_selector).next())
            .ok_or_else(|| {
                FetchError::parse(target.clone(), format!("row {} has no building link", index))
            })?;

        let id = link
            .value()
            .attr("href")
            .and_then(last_path_segment)
            .ok_or_else(|| {
                FetchError::parse(target.clone(), format!("row {} has an empty link", index))
            })?;

        let floors = cells
            .get(BUILDING_FLOORS_CELL)
            .map(|cell| element_text(cell))
            .and_then(|text| parse_leading_number(&text))
            .map(|n| n as u32);

        buildings.push(Building {
            id,
            name: element_text(&link),
            floors,
        });
    }

    Ok(buildings)
}

/// Parses a unit page for one building
pub fn parse_units(html: &str, property_id: &str, building_id: &str) -> FetchResult<Vec<Unit>> {
    let target = FetchTarget::Units {
        property_id: property_id.to_string(),
        building_id: building_id.to_string(),
    };
    let document = Html::parse_document(html);

    if document.select(&selector(UNIT_TABLE, &target)?).next().is_none() {
        return Err(FetchError::parse(target, format!("{} not found", UNIT_TABLE)));
    }

    let row_selector = selector(UNIT_ROWS, &target)?;
    let cell_selector = selector("td", &target)?;
    let mut units = Vec::new();

    for (index, row) in document.select(&row_selector).enumerate() {
        let cells: Vec<String> = row.select(&cell_selector).map(|c| element_text(&c)).collect();
        if cells.is_empty() {
            continue; // header row
        }

        if cells.len() < UNIT_CELLS {
            return Err(FetchError::parse(
                target,
                format!(
                    "row {} has {} cells, expected {}",
                    index,
                    cells.len(),
                    UNIT_CELLS
                ),
            ));
        }

        let id = cells[UNIT_ID_CELL].clone();
        if id.is_empty() {
            return Err(FetchError::parse(
                target,
                format!("row {} has an empty unit id", index),
            ));
        }

        units.push(Unit {
            id,
            area: parse_leading_number(&cells[UNIT_AREA_CELL]),
            status: cells[UNIT_STATUS_CELL].clone(),
        });
    }

    Ok(units)
}

/// Compiles one of the fixed selectors above
fn selector(css: &str, target: &FetchTarget) -> FetchResult<Selector> {
    Selector::parse(css)
        .map_err(|_| FetchError::parse(target.clone(), format!("invalid selector {}", css)))
}

fn first_text(element: &ElementRef, selector: &Selector) -> Option<String> {
    element.select(selector).next().map(|e| element_text(&e))
}

/// Collects an element's text with whitespace collapsed
fn element_text(element: &ElementRef) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn last_path_segment(href: &str) -> Option<String> {
    href.split(['?', '#'])
        .next()?
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Reads the leading decimal number of a cell, ignoring unit suffixes
fn parse_leading_number(text: &str) -> Option<f64> {
    let number: String = text
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    number.parse().ok()
}
