//! In-memory collaborators for pipeline tests.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{Value, json};
use time::{Date, Month};

use crate::{
    Analyst, Bar, Concept, ConceptSource, ConceptStore, FactorEngine, LimitUpStock, MarketSource,
    MarketStore, Quote, RankedSector, SectorDay, SectorSource,
};

/// A day of January 2024.
pub fn date(d: u8) -> Date {
    Date::from_calendar_date(2024, Month::January, d).unwrap()
}

fn quote(code: &str) -> Quote {
    Quote {
        code: code.to_string(),
        name: format!("stock {code}"),
        price: 10.0,
        change_pct: 1.5,
        volume: 1_000.0,
        amount: 10_000.0,
    }
}

fn strings(codes: &[&str]) -> Vec<String> {
    codes.iter().map(|c| c.to_string()).collect()
}

#[derive(Default)]
struct MarketCalls {
    spot: usize,
    history: usize,
    upserted: usize,
    backfilled: bool,
    weekly: bool,
    monthly: bool,
}

pub struct FakeMarket {
    today: Option<Date>,
    spot: Vec<Quote>,
    dragon_tiger: Vec<Quote>,
    broken: HashSet<String>,
    stored_days: HashSet<Date>,
    stored_codes: HashSet<String>,
    candidates: Vec<String>,
    calls: Mutex<MarketCalls>,
}

impl FakeMarket {
    pub fn new(today: Date) -> Self {
        Self {
            today: Some(today),
            spot: Vec::new(),
            dragon_tiger: Vec::new(),
            broken: HashSet::new(),
            stored_days: HashSet::new(),
            stored_codes: HashSet::new(),
            candidates: Vec::new(),
            calls: Mutex::new(MarketCalls::default()),
        }
    }

    pub fn with_spot(mut self, codes: &[&str]) -> Self {
        self.spot = codes.iter().map(|c| quote(c)).collect();
        self
    }

    pub fn with_dragon_tiger(mut self, codes: &[&str]) -> Self {
        self.dragon_tiger = codes.iter().map(|c| quote(c)).collect();
        self
    }

    pub fn with_broken_history(mut self, codes: &[&str]) -> Self {
        self.broken.extend(strings(codes));
        self
    }

    pub fn with_stored_days(mut self, days: &[Date]) -> Self {
        self.stored_days.extend(days.iter().copied());
        self
    }

    pub fn with_stored_codes(mut self, codes: &[&str]) -> Self {
        self.stored_codes.extend(strings(codes));
        self
    }

    pub fn with_candidates(mut self, codes: &[&str]) -> Self {
        self.candidates = strings(codes);
        self
    }

    pub fn without_calendar(mut self) -> Self {
        self.today = None;
        self
    }

    pub fn spot_calls(&self) -> usize {
        self.calls.lock().unwrap().spot
    }

    pub fn history_calls(&self) -> usize {
        self.calls.lock().unwrap().history
    }

    pub fn upserted_rows(&self) -> usize {
        self.calls.lock().unwrap().upserted
    }

    pub fn backfilled(&self) -> bool {
        self.calls.lock().unwrap().backfilled
    }

    pub fn rollups_built(&self) -> bool {
        let calls = self.calls.lock().unwrap();
        calls.weekly && calls.monthly
    }
}

#[async_trait]
impl MarketSource for FakeMarket {
    async fn latest_trade_date(&self) -> anyhow::Result<Option<Date>> {
        Ok(self.today)
    }

    async fn spot_quotes(&self) -> anyhow::Result<Vec<Quote>> {
        self.calls.lock().unwrap().spot += 1;
        Ok(self.spot.clone())
    }

    async fn dragon_tiger(&self, _: Date) -> anyhow::Result<Vec<Quote>> {
        Ok(self.dragon_tiger.clone())
    }

    async fn history(&self, code: &str, _: Date, end: Date) -> anyhow::Result<Vec<Bar>> {
        self.calls.lock().unwrap().history += 1;
        if self.broken.contains(code) {
            anyhow::bail!("upstream timeout for {code}");
        }
        Ok(vec![Bar {
            code: code.to_string(),
            date: end,
            open: 10.0,
            high: 11.0,
            low: 9.5,
            close: 10.5,
            volume: 1_000.0,
            amount: 10_500.0,
        }])
    }
}

#[async_trait]
impl MarketStore for FakeMarket {
    async fn save_basic_info(&self, quotes: &[Quote]) -> anyhow::Result<usize> {
        Ok(quotes.len())
    }

    async fn bar_count_on(&self, date: Date) -> anyhow::Result<usize> {
        Ok(if self.stored_days.contains(&date) {
            self.stored_codes.len().max(1)
        } else {
            0
        })
    }

    async fn codes_with_bars(&self, codes: &[String]) -> anyhow::Result<usize> {
        Ok(codes.iter().filter(|c| self.stored_codes.contains(*c)).count())
    }

    async fn upsert_spot_bars(&self, _: Date, quotes: &[Quote]) -> anyhow::Result<usize> {
        self.calls.lock().unwrap().upserted += quotes.len();
        Ok(quotes.len())
    }

    async fn save_bars(&self, _: &str, bars: &[Bar]) -> anyhow::Result<usize> {
        Ok(bars.len())
    }

    async fn candidates(&self, _: usize, limit: usize) -> anyhow::Result<Vec<String>> {
        Ok(self.candidates.iter().take(limit).cloned().collect())
    }

    async fn backfill_limit_up(&self, _: Date, _: Date) -> anyhow::Result<usize> {
        self.calls.lock().unwrap().backfilled = true;
        Ok(0)
    }

    async fn rebuild_weekly(&self, codes: &[String]) -> anyhow::Result<usize> {
        self.calls.lock().unwrap().weekly = true;
        Ok(codes.len())
    }

    async fn rebuild_monthly(&self, codes: &[String]) -> anyhow::Result<usize> {
        self.calls.lock().unwrap().monthly = true;
        Ok(codes.len())
    }
}

/// One row `{"code": ..}` per requested code.
pub struct FakeFactors;

#[async_trait]
impl FactorEngine for FakeFactors {
    async fn compute(&self, codes: &[String], _: Option<&[String]>) -> anyhow::Result<Vec<Value>> {
        Ok(codes.iter().map(|c| json!({ "code": c, "score": 1.0 })).collect())
    }
}

#[derive(Default)]
pub struct FakeConcepts {
    listing: Vec<Concept>,
    members: HashMap<String, Vec<String>>,
    cleared: Mutex<bool>,
    saved: Mutex<Vec<String>>,
}

impl FakeConcepts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_concept(mut self, code: &str, name: &str, members: &[&str]) -> Self {
        self.listing.push(Concept {
            code: code.into(),
            name: name.into(),
        });
        self.members.insert(code.into(), strings(members));
        self
    }

    /// Listed, but fetching its members fails.
    pub fn with_broken(mut self, code: &str, name: &str) -> Self {
        self.listing.push(Concept {
            code: code.into(),
            name: name.into(),
        });
        self
    }

    pub fn was_cleared(&self) -> bool {
        *self.cleared.lock().unwrap()
    }

    pub fn saved(&self) -> Vec<String> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConceptSource for FakeConcepts {
    async fn list_concepts(&self) -> anyhow::Result<Vec<Concept>> {
        Ok(self.listing.clone())
    }

    async fn members(&self, concept: &Concept) -> anyhow::Result<Vec<String>> {
        self.members
            .get(&concept.code)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("member page of {concept} unavailable"))
    }
}

#[async_trait]
impl ConceptStore for FakeConcepts {
    async fn clear(&self) -> anyhow::Result<()> {
        *self.cleared.lock().unwrap() = true;
        Ok(())
    }

    async fn save_concept(&self, concept: &Concept, members: &[String]) -> anyhow::Result<usize> {
        self.saved.lock().unwrap().push(concept.code.clone());
        Ok(members.len())
    }
}

pub struct FakeSectors {
    today: Option<Date>,
    sectors: Vec<SectorDay>,
    snapshots: Mutex<usize>,
}

impl FakeSectors {
    pub fn new(today: Date) -> Self {
        Self {
            today: Some(today),
            sectors: Vec::new(),
            snapshots: Mutex::new(0),
        }
    }

    /// No stored market data at all.
    pub fn empty() -> Self {
        Self {
            today: None,
            sectors: Vec::new(),
            snapshots: Mutex::new(0),
        }
    }

    /// `limit_ups` pairs a code with its trailing limit-up count.
    pub fn with_sector(
        mut self,
        code: &str,
        name: &str,
        total_stocks: usize,
        limit_ups: &[(&str, u32)],
    ) -> Self {
        self.sectors.push(SectorDay {
            sector_code: code.into(),
            sector_name: name.into(),
            total_stocks,
            limit_ups: limit_ups
                .iter()
                .map(|(code, count)| LimitUpStock {
                    code: code.to_string(),
                    name: format!("stock {code}"),
                    limit_up_count: *count,
                    price: 12.3,
                })
                .collect(),
        });
        self
    }

    pub fn snapshot_calls(&self) -> usize {
        *self.snapshots.lock().unwrap()
    }
}

#[async_trait]
impl SectorSource for FakeSectors {
    async fn latest_trade_date(&self) -> anyhow::Result<Option<Date>> {
        Ok(self.today)
    }

    async fn sector_day(&self, _: Date) -> anyhow::Result<Vec<SectorDay>> {
        *self.snapshots.lock().unwrap() += 1;
        Ok(self.sectors.clone())
    }
}

#[derive(Default)]
pub struct FakeAnalyst {
    failing: HashSet<String>,
    delay: Option<Duration>,
    calls: Mutex<usize>,
}

impl FakeAnalyst {
    pub fn failing_on(mut self, sector_name: &str) -> Self {
        self.failing.insert(sector_name.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Analyst for FakeAnalyst {
    async fn summarize(&self, sector: &RankedSector, _: Date) -> anyhow::Result<String> {
        *self.calls.lock().unwrap() += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&sector.sector_name) {
            anyhow::bail!("model quota exceeded");
        }
        Ok(format!(
            "{}: {} limit-ups",
            sector.sector_name, sector.limit_up_count_today
        ))
    }
}
