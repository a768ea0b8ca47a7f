use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;

use crate::assets::FlierStore;
use crate::compose::{self, ContentGenerator};
use crate::db::Store;
use crate::dispatch::{Dispatcher, Notification};
use crate::models::{EventRecord, EventRef};
use crate::schedule::{self, ReminderOffsets};
use crate::scraping::detail::EventExtractor;
use crate::scraping::{EventSource, RegionCapture, Renderer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Extract,
    Generate,
    Dispatch,
    Store,
}

#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    pub stage: Stage,
    pub target: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SentReminder {
    pub event_id: String,
    pub title: String,
    pub offset_days: u32,
    pub dispatch_id: String,
}

#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    pub discovered: usize,
    pub extracted: usize,
    pub due: usize,
    pub skipped_already_sent: usize,
    pub sent: Vec<SentReminder>,
    pub failures: Vec<Failure>,
}

impl RunReport {
    fn fail(&mut self, stage: Stage, target: impl Into<String>, reason: impl ToString) {
        let failure = Failure {
            stage,
            target: target.into(),
            reason: reason.to_string(),
        };
        log::warn!(
            "{:?} failed for {}: {}",
            failure.stage,
            failure.target,
            failure.reason
        );
        self.failures.push(failure);
    }

    pub fn log_summary(&self) {
        log::info!(
            "discovered {}, extracted {}, due {}, sent {}, already sent {}, failures {}",
            self.discovered,
            self.extracted,
            self.due,
            self.sent.len(),
            self.skipped_already_sent,
            self.failures.len()
        );
        for failure in &self.failures {
            log::info!(
                "  {:?} {}: {}",
                failure.stage,
                failure.target,
                failure.reason
            );
        }
    }
}

/// Discovery and extraction half of a run.
pub struct Collector<S, R> {
    source: S,
    renderer: R,
    extractor: EventExtractor,
    assets: FlierStore,
}

impl<S, R> Collector<S, R>
where
    S: EventSource,
    R: Renderer + RegionCapture,
{
    pub fn new(source: S, renderer: R, extractor: EventExtractor, assets: FlierStore) -> Self {
        Self {
            source,
            renderer,
            extractor,
            assets,
        }
    }

    /// Fetches the listing. A fetch failure is an error; an empty listing is not.
    pub fn discover(&mut self) -> Result<Vec<EventRef>> {
        let url = self.source.listing_url().to_string();
        let listing = self
            .renderer
            .fetch(&url)
            .with_context(|| format!("unable to fetch listing {url}"))?;
        Ok(self.source.discover(&listing))
    }

    /// Fetches and extracts every discovered event, skipping the ones that
    /// fail. Records come back in listing order.
    pub fn collect(&mut self, report: &mut RunReport) -> Result<Vec<EventRecord>> {
        let refs = self.discover()?;
        report.discovered = refs.len();

        let mut events = Vec::with_capacity(refs.len());
        for reference in &refs {
            let page = match self.renderer.fetch(&reference.url) {
                Ok(page) => page,
                Err(err) => {
                    report.fail(Stage::Fetch, reference.url.as_str(), err);
                    continue;
                }
            };
            match self
                .extractor
                .extract(reference, &page, &mut self.renderer, &self.assets)
            {
                Ok(record) => {
                    log::debug!("extracted {} ({})", record.title, record.event_instant);
                    events.push(record);
                }
                Err(err) => report.fail(Stage::Extract, reference.url.as_str(), err),
            }
        }
        report.extracted = events.len();
        Ok(events)
    }
}

/// One full run: collect, schedule, draft and send. Owns every collaborator;
/// they are released when the pipeline is dropped at the end of `run`.
pub struct Pipeline<S, R, G, D> {
    collector: Collector<S, R>,
    generator: G,
    dispatcher: D,
    store: Store,
    offsets: ReminderOffsets,
    organization: String,
    record_sends: bool,
}

impl<S, R, G, D> Pipeline<S, R, G, D>
where
    S: EventSource,
    R: Renderer + RegionCapture,
    G: ContentGenerator,
    D: Dispatcher,
{
    pub fn new(
        collector: Collector<S, R>,
        generator: G,
        dispatcher: D,
        store: Store,
        offsets: ReminderOffsets,
        organization: impl Into<String>,
    ) -> Self {
        Self {
            collector,
            generator,
            dispatcher,
            store,
            offsets,
            organization: organization.into(),
            record_sends: true,
        }
    }

    /// Dry runs still consult the sent log but never append to it.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.record_sends = !dry_run;
        self
    }

    pub fn run(mut self, today: NaiveDate) -> Result<RunReport> {
        let mut report = RunReport::default();

        let mut events = self.collector.collect(&mut report)?;
        if report.discovered == 0 {
            log::info!("no events listed; nothing to do");
            return Ok(report);
        }
        for event in &events {
            if let Err(err) = self.store.upsert_event(event) {
                log::warn!("failed to record event {}: {err}", event.id);
            }
        }

        let due: Vec<(usize, u32)> = schedule::due_today(today, &events, &self.offsets)
            .iter()
            .map(|d| (d.index, d.offset_days))
            .collect();
        report.due = due.len();
        if due.is_empty() {
            log::info!("no reminders due on {today}");
            return Ok(report);
        }

        for (index, offset_days) in due {
            self.notify(&mut events[index], offset_days, &mut report);
        }

        Ok(report)
    }

    fn notify(&mut self, event: &mut EventRecord, offset_days: u32, report: &mut RunReport) {
        let target = format!("{} ({}d)", event.title, offset_days);

        match self.store.is_sent(&event.id, offset_days) {
            Ok(true) => {
                log::info!("already sent {target}");
                report.skipped_already_sent += 1;
                return;
            }
            Ok(false) => {}
            Err(err) => {
                report.fail(Stage::Store, target, err);
                return;
            }
        }

        if event.generated_content().is_none() {
            let prompt = compose::build_prompt(event, &self.organization);
            match self.generator.generate(&prompt) {
                Ok(text) => {
                    event.set_generated_content(text);
                }
                Err(err) => {
                    report.fail(Stage::Generate, target, err);
                    return;
                }
            }
        }

        let event = &*event;
        if event.flier.is_none() {
            log::warn!("{target} has no flier; sending text only");
        }
        let notification = Notification {
            event,
            offset_days,
            subject: compose::subject_line(event, offset_days),
            content: event.generated_content().unwrap_or_default().to_string(),
            flier: event.flier.as_ref(),
        };

        let dispatch_id = match self.dispatcher.send(&notification) {
            Ok(id) => id,
            Err(err) => {
                report.fail(Stage::Dispatch, target, err);
                return;
            }
        };
        log::info!("sent {target} as {dispatch_id}");

        if self.record_sends {
            if let Err(err) = self.store.mark_sent(&event.id, offset_days, &dispatch_id) {
                log::error!(
                    "{target} was sent as {dispatch_id} but not recorded; add ({}, {offset_days}) to the notifications table or it will be sent again: {err}",
                    event.id
                );
                report.fail(Stage::Store, target.as_str(), err);
            }
        }
        report.sent.push(SentReminder {
            event_id: event.id.clone(),
            title: event.title.clone(),
            offset_days,
            dispatch_id,
        });
    }
}
