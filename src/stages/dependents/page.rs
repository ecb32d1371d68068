//! Scraping of one page of the dependents listing.

use crate::model::{DependentListing, DependentRepository};
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use url::Url;

const LOG_TARGET: &str = "dependents";

static ITEM: LazyLock<Selector> = LazyLock::new(|| selector("#dependents .Box .flex-items-center"));
static LINK: LazyLock<Selector> = LazyLock::new(|| selector("span a"));
static COUNTER: LazyLock<Selector> = LazyLock::new(|| selector("div > span"));
static PAGINATION: LazyLock<Selector> = LazyLock::new(|| selector(".paginate-container a"));

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("selector is valid CSS")
}

/// Entries found on one listing page plus the link to the page after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependentsPage {
    pub listings: Vec<DependentListing>,
    pub next: Option<Url>,
}

/// Parse a listing page fetched from `page_url`.
#[must_use]
pub fn parse_page(body: &str, page_url: &Url) -> DependentsPage {
    let document = Html::parse_document(body);

    let listings = document.select(&ITEM).map(parse_item).collect();

    let next = document
        .select(&PAGINATION)
        .find(|link| text_of(*link).eq_ignore_ascii_case("next"))
        .and_then(|link| link.value().attr("href"))
        .and_then(|href| match page_url.join(href) {
            Ok(url) => Some(url),
            Err(e) => {
                log::warn!(target: LOG_TARGET, "Ignoring unusable next-page link '{href}' on '{page_url}': {e}");
                None
            }
        });

    DependentsPage { listings, next }
}

fn parse_item(item: ElementRef<'_>) -> DependentListing {
    let links: Vec<_> = item.select(&LINK).collect();
    let [org, repo] = links.as_slice() else {
        return DependentListing::not_enough_links();
    };

    // The first counter-like span holds the links; stars and forks follow it.
    let mut counters = item.select(&COUNTER).skip(1).map(|span| parse_count(&text_of(span)));

    DependentListing::Repository(DependentRepository {
        org_name: text_of(*org),
        repo_name: text_of(*repo),
        stars: counters.next().unwrap_or_default(),
        forks: counters.next().unwrap_or_default(),
    })
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn parse_count(text: &str) -> u64 {
    text.chars().filter(|c| *c != ',').collect::<String>().parse().unwrap_or(0)
}
