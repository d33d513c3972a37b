//! Average household income from Doogal's postcode pages.
//!
//! Used only to enrich Census records; every failure degrades to "unknown".

use areascope::{LocationKey, ScraperError};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::document_text;
use crate::acquisition::{FetchClient, RequestOptions};
use reqwest::Method;

pub const DEFAULT_BASE_URL: &str = "https://www.doogal.co.uk";

const INCOME_LABEL: &str = "average household income";

/// Fetch the income page for `key` and extract the figure.
pub async fn fetch_income(
    client: &FetchClient,
    base_url: &str,
    key: &LocationKey,
) -> Result<Option<i64>, ScraperError> {
    let url = super::join_url(base_url, "ShowMap");
    let options = RequestOptions::default().query("postcode", key.as_str());
    let response = client.request(&url, Method::GET, &options).await?;
    Ok(parse_income(&response.body))
}

/// Income in pounds from a Doogal page, trying the table layout first and
/// a page-wide search last.
pub fn parse_income(html: &str) -> Option<i64> {
    let doc = Html::parse_document(html);
    let pounds = Regex::new(r"£\s*([\d,]+)").expect("pound regex is valid");
    let amount = |text: &str| -> Option<i64> {
        let caps = pounds.captures(text)?;
        caps.get(1)?.as_str().replace(',', "").parse().ok()
    };

    // <th>Average household income (2020)</th><td>...<span class="show">£68,500</span></td>
    for label_tag in ["th", "td"] {
        let Ok(label_sel) = Selector::parse(label_tag) else {
            continue;
        };
        for cell in doc.select(&label_sel) {
            let label = cell.text().collect::<String>().to_lowercase();
            if !label.contains(INCOME_LABEL) {
                continue;
            }
            let Some(value_cell) = next_element_sibling(cell) else {
                continue;
            };
            if let Ok(show) = Selector::parse("span.show") {
                if let Some(found) = value_cell
                    .select(&show)
                    .find_map(|span| amount(&span.text().collect::<String>()))
                {
                    return Some(found);
                }
            }
            if let Some(found) = amount(&value_cell.text().collect::<String>()) {
                return Some(found);
            }
        }
    }

    let page_wide = Regex::new(r"(?i)average\s+household\s+income.*?£\s*([\d,]+)")
        .expect("income regex is valid");
    page_wide
        .captures(&document_text(&doc))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
}

fn next_element_sibling(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element.next_siblings().find_map(ElementRef::wrap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_income_from_table() {
        let html = r#"
            <table><tr>
              <th>Average household income (2020)</th>
              <td colspan="2"><div class="progress"><div class="progress-bar">
                <span class="show">£68,500</span>
              </div></div></td>
            </tr></table>"#;
        assert_eq!(parse_income(html), Some(68_500));
    }

    #[test]
    fn test_parse_income_from_td_label() {
        let html = r#"<table><tr><td>Average household income</td><td>£41,200 per year</td></tr></table>"#;
        assert_eq!(parse_income(html), Some(41_200));
    }

    #[test]
    fn test_parse_income_page_wide() {
        let html = "<div><p>Average household income is about</p><p>£39,900</p></div>";
        assert_eq!(parse_income(html), Some(39_900));
    }

    #[test]
    fn test_parse_income_missing() {
        assert_eq!(parse_income("<p>No data</p>"), None);
    }
}
