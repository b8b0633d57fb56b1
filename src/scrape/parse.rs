//! HTML parsing of registry pages

use super::ScrapeError;
use crate::{ProgramRecord, StudentNumber, StudentRecord};
use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};
use tracing::warn;

fn selector(css: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(css).map_err(|e| ScrapeError::Parse(format!("invalid selector {css}: {e:?}")))
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// `(label, value)` pairs of every table row with exactly two cells
pub fn label_rows(html: &str) -> Result<Vec<(String, String)>, ScrapeError> {
    let document = Html::parse_document(html);
    let row_selector = selector("tr")?;
    let cell_selector = selector("td")?;

    let rows = document
        .select(&row_selector)
        .filter_map(|row| {
            let cells: Vec<_> = row.select(&cell_selector).collect();
            match cells.as_slice() {
                [label, value] => Some((cell_text(*label), cell_text(*value))),
                _ => None,
            }
        })
        .collect();
    Ok(rows)
}

/// Build a student from the personal and academic detail pages
pub fn parse_student(
    std_no: StudentNumber,
    personal_html: &str,
    academic_html: &str,
) -> Result<StudentRecord, ScrapeError> {
    let mut record = StudentRecord::new(std_no, "");
    let mut seen_id = false;

    for (label, value) in label_rows(academic_html)? {
        match label.as_str() {
            "ID" => {
                let page_id: StudentNumber = value.parse().map_err(|_| {
                    ScrapeError::Parse(format!("student {std_no}: unreadable ID {value:?}"))
                })?;
                if page_id != std_no {
                    return Err(ScrapeError::Parse(format!(
                        "requested student {std_no} but page shows {page_id}"
                    )));
                }
                seen_id = true;
            }
            "Name" => record.name = value,
            "IC/Passport" => record.national_id = non_empty(value),
            "Contact No" => record.phone1 = non_empty(value),
            "Contact No 2" => record.phone2 = non_empty(value),
            _ => {}
        }
    }

    // The registry renders an empty view for unknown students
    if !seen_id || record.name.is_empty() {
        return Err(ScrapeError::NotFound(std_no));
    }

    for (label, value) in label_rows(personal_html)? {
        match label.as_str() {
            "Birthdate" if !value.is_empty() => {
                match NaiveDate::parse_from_str(&value, "%Y-%m-%d") {
                    Ok(date) => record.date_of_birth = Some(date),
                    Err(e) => warn!(std_no, value = %value, error = %e, "Unreadable birthdate"),
                }
            }
            "Sex" => record.gender = non_empty(value),
            "Marital" => record.marital_status = non_empty(value),
            "Religion" => record.religion = non_empty(value),
            _ => {}
        }
    }

    Ok(record)
}

/// Program rows of the `#ewlistmain` table, skipping deleted enrolments
pub fn parse_programs(html: &str) -> Result<Vec<ProgramRecord>, ScrapeError> {
    let document = Html::parse_document(html);
    let table_selector = selector("table#ewlistmain")?;
    let row_selector = selector("tr")?;
    let cell_selector = selector("td")?;
    let link_selector = selector("a")?;

    let Some(table) = document.select(&table_selector).next() else {
        return Ok(Vec::new());
    };

    let mut programs = Vec::new();
    for row in table.select(&row_selector).skip(1) {
        let cells: Vec<_> = row.select(&cell_selector).collect();
        if cells.len() < 6 {
            continue;
        }

        let id = cells[cells.len() - 1]
            .select(&link_selector)
            .next()
            .and_then(|link| link.value().attr("href"))
            .and_then(program_id);
        let Some(id) = id else {
            continue;
        };

        let status = cell_text(cells[4]);
        if status == "Deleted" {
            continue;
        }

        let version = cell_text(cells[2]);
        let name = non_empty(cell_text(cells[1])).unwrap_or_else(|| version.clone());

        programs.push(ProgramRecord {
            id,
            name,
            version,
            status,
        });
    }

    Ok(programs)
}

/// Program id from a view link such as `r_stdprogramview.php?StdProgramID=7781&x=1`
fn program_id(href: &str) -> Option<i64> {
    let (_, rest) = href.split_once("ProgramID=")?;
    let value = rest.split(['&', '#']).next().unwrap_or_default();
    value.trim().parse().ok()
}
