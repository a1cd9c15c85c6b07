//! End-to-end runs against the simulated renderer: partitioned workers,
//! cross-worker dedupe, crash recovery, and the merged dataset on disk.

use std::sync::Arc;

use leadharvest_common::{LeadStatus, Query};
use leadharvest_crawler::harvest::{self, HarvestConfig};
use leadharvest_crawler::store::{CsvStore, LeadStore};
use leadharvest_crawler::testing::{
    zero_delay_worker_config, PhoneChannel, SimCard, SimRenderer, SimRendererFactory,
};

fn market_feed() -> Vec<SimCard> {
    vec![
        SimCard::new("Apex Rubber Industries")
            .with_phone("+91 98765 43210", PhoneChannel::Button)
            .with_website("https://apexrubber.in")
            .with_category("Rubber products manufacturer")
            .with_address("Plot 4, MIA Industrial Area, Jaipur, Rajasthan"),
        SimCard::new("Zenith Polymers Pvt Ltd")
            .with_phone("+91 91234 56780", PhoneChannel::TelLink)
            .with_website("https://zenithpolymers.com")
            .with_category("Manufacturer")
            .with_address("Sitapura, Jaipur, Rajasthan"),
        SimCard::new("Orbit Tyre Factory")
            .with_phone("+91 99887 76655", PhoneChannel::Button)
            .with_website("https://orbittyre.in")
            .with_category("Manufacturer")
            .with_rating(4.8, 120)
            .with_address("VKI Area, Jaipur, Rajasthan"),
        SimCard::new("Sharma Tyre Traders")
            .with_phone("+91 90000 11122", PhoneChannel::Button)
            .with_category("Tyre dealer")
            .with_address("Station Road, Jaipur, Rajasthan"),
        SimCard::new("City Tyres")
            .with_phone("+91 90909 08080", PhoneChannel::PageText)
            .with_category("Tyre shop")
            .with_address("MI Road, Jaipur, Rajasthan"),
    ]
}

fn harvest_config(dir: &tempfile::TempDir, workers: usize) -> HarvestConfig {
    HarvestConfig {
        workers,
        worker: zero_delay_worker_config(),
        output_dir: dir.path().to_path_buf(),
        ..HarvestConfig::default()
    }
}

#[tokio::test]
async fn two_workers_over_the_same_market_produce_one_deduplicated_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let factory = Arc::new(SimRendererFactory::scripted(vec![
        SimRenderer::new(market_feed()),
        SimRenderer::new(market_feed()),
    ]));

    let stats = harvest::run(
        vec![
            Query::with_locality("tyre manufacturer", "Jaipur"),
            Query::with_locality("rubber manufacturer", "Jaipur"),
        ],
        factory,
        harvest_config(&dir, 2),
    )
    .await
    .unwrap();

    // Both workers saw the same five businesses; the merge collapses them.
    assert_eq!(stats.total_unique, 5);
    assert_eq!(stats.approved, 3);
    assert_eq!(stats.workers_aborted(), 0);
    assert_eq!(stats.reports.len(), 2);
    for report in &stats.reports {
        assert_eq!(report.queries_completed, 1);
    }

    let dataset = CsvStore::new(
        dir.path().join("leads.csv"),
        leadharvest_common::DedupeStrategy::PhoneThenName,
    );
    let leads = dataset.load().await.unwrap();
    assert_eq!(leads.len(), 5);

    let apex = leads
        .iter()
        .find(|l| l.brand_name == "Apex Rubber Industries")
        .unwrap();
    assert_eq!(apex.phone, "+919876543210");
    assert_eq!(apex.city, "Jaipur");
    assert_eq!(apex.state, "Rajasthan");
    assert_eq!(apex.status, LeadStatus::Approved);

    let traders = leads
        .iter()
        .find(|l| l.brand_name == "Sharma Tyre Traders")
        .unwrap();
    assert_eq!(traders.status, LeadStatus::Rejected);

    // Page-sweep phone channel still lands in the dataset normalized.
    let city_tyres = leads.iter().find(|l| l.brand_name == "City Tyres").unwrap();
    assert_eq!(city_tyres.phone, "+919090908080");
}

#[tokio::test]
async fn crashed_renderer_is_replaced_and_the_dataset_is_still_complete() {
    let dir = tempfile::tempdir().unwrap();
    let factory = Arc::new(SimRendererFactory::scripted(vec![
        SimRenderer::new(market_feed()).with_crash_after_clicks(4),
        SimRenderer::new(market_feed()),
    ]));

    let stats = harvest::run(
        vec![Query::with_locality("tyre manufacturer", "Jaipur")],
        factory,
        harvest_config(&dir, 1),
    )
    .await
    .unwrap();

    assert_eq!(stats.workers_aborted(), 0);
    assert_eq!(stats.reports[0].renderer_restarts, 1);
    // Leads extracted before the crash are re-extracted after the restart
    // and collapse on merge.
    assert_eq!(stats.total_unique, 5);
}

#[tokio::test]
async fn worker_without_a_renderer_aborts_while_the_other_finishes() {
    let dir = tempfile::tempdir().unwrap();
    // One scripted renderer for two workers; whichever worker misses out
    // exhausts its startup retries and aborts.
    let factory = Arc::new(SimRendererFactory::scripted(vec![SimRenderer::new(
        market_feed(),
    )]));

    let stats = harvest::run(
        vec![
            Query::with_locality("tyre manufacturer", "Jaipur"),
            Query::with_locality("rubber manufacturer", "Jaipur"),
        ],
        factory,
        harvest_config(&dir, 2),
    )
    .await
    .unwrap();

    assert_eq!(stats.workers_aborted(), 1);
    assert_eq!(stats.total_unique, 5);
}
