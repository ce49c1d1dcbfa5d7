//! The three feature pages and the shutdown sweep across them.

use super::page::{PageController, ShutdownReport};
use crate::backend::Services;
use crate::model::{Feature, PageEvent};
use std::time::Duration;
use tracing::info;

pub struct Hub {
    pages: Vec<PageController>,
}

impl Hub {
    pub fn new(services: Services, event_capacity: usize) -> Self {
        let pages = Feature::ALL
            .iter()
            .map(|&feature| PageController::new(feature, services.clone(), event_capacity))
            .collect();
        Self { pages }
    }

    pub fn page(&self, feature: Feature) -> &PageController {
        &self.pages[feature.index()]
    }

    pub fn page_mut(&mut self, feature: Feature) -> &mut PageController {
        &mut self.pages[feature.index()]
    }

    /// Drain ready events from every page, in tab order.
    pub fn dispatch(&mut self) -> Vec<PageEvent> {
        self.pages.iter_mut().flat_map(|page| page.poll()).collect()
    }

    pub fn any_busy(&self) -> bool {
        self.pages.iter().any(PageController::is_busy)
    }

    /// Cancel every busy page. Each page waits at most `timeout`; this never fails.
    pub fn shutdown(&mut self, timeout: Duration) -> Vec<ShutdownReport> {
        let reports: Vec<ShutdownReport> = self
            .pages
            .iter_mut()
            .filter_map(|page| page.shutdown(timeout))
            .collect();
        let started: usize = self.pages.iter().map(PageController::tasks_started).sum();
        info!(started, cancelled = reports.len(), "hub shut down");
        reports
    }
}
