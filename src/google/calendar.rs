//! Google Calendar v3 client.

use super::{http_client, read_json, send_error, API_TIMEOUT};
use crate::dates::DateRange;
use crate::error::{AppError, Result};
use crate::models::{Attachment, Attendee, CalendarEvent, CalendarInfo, ResponseStatus};
use crate::ports::{CalendarSource, CredentialProvider};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat, TimeZone, Utc};
use reqwest::Url;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const SERVICE: &str = "Google Calendar";

/// Reads calendars and events for the authenticated user.
pub struct GoogleCalendarClient {
    http: reqwest::Client,
    credentials: Arc<dyn CredentialProvider>,
    base_url: String,
    calendar_id: String,
    page_size: u32,
}

impl GoogleCalendarClient {
    pub fn new(
        credentials: Arc<dyn CredentialProvider>,
        calendar_id: impl Into<String>,
        page_size: u32,
    ) -> Result<Self> {
        Ok(Self {
            http: http_client(API_TIMEOUT)?,
            credentials,
            base_url: CALENDAR_API_BASE.to_string(),
            calendar_id: calendar_id.into(),
            page_size,
        })
    }

    /// Point the client at another API root.
    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| AppError::Provider(format!("Invalid calendar API base: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| AppError::Provider("Calendar API base cannot hold a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_page<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T> {
        let token = self.credentials.access_token().await?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(|e| send_error(SERVICE, e))?;
        read_json(SERVICE, response).await
    }
}

#[async_trait]
impl CalendarSource for GoogleCalendarClient {
    async fn list_calendars(&self) -> Result<Vec<CalendarInfo>> {
        let url = self.url(&["users", "me", "calendarList"])?;
        let mut calendars = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = Vec::new();
            if let Some(ref token) = page_token {
                query.push(("pageToken", token.clone()));
            }

            let page: CalendarListPage = self.get_page(url.clone(), &query).await?;
            calendars.extend(page.items.into_iter().map(|entry| CalendarInfo {
                summary: entry.summary.unwrap_or_else(|| entry.id.clone()),
                id: entry.id,
                primary: entry.primary,
            }));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(calendars)
    }

    async fn list_events(&self, range: &DateRange) -> Result<Vec<CalendarEvent>> {
        let url = self.url(&["calendars", self.calendar_id.as_str(), "events"])?;
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        info!("Fetching events {}", range);

        loop {
            let mut query = vec![
                (
                    "timeMin",
                    range.start.to_rfc3339_opts(SecondsFormat::Secs, true),
                ),
                ("timeMax", range.end.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("maxResults", self.page_size.to_string()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ];
            if let Some(ref token) = page_token {
                query.push(("pageToken", token.clone()));
            }

            let page: EventsPage = self.get_page(url.clone(), &query).await?;
            for raw in page.items {
                if let Some(event) = raw.into_event() {
                    events.push(event);
                }
            }
            info!("Got {} events so far", events.len());

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(events)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarListPage {
    #[serde(default)]
    items: Vec<CalendarListEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CalendarListEntry {
    id: String,
    summary: Option<String>,
    #[serde(default)]
    primary: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsPage {
    #[serde(default)]
    items: Vec<GoogleEvent>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEvent {
    id: String,
    status: Option<String>,
    summary: Option<String>,
    start: Option<EventTime>,
    end: Option<EventTime>,
    #[serde(default)]
    attendees: Vec<GoogleAttendee>,
    creator: Option<GooglePerson>,
    #[serde(default)]
    attachments: Vec<GoogleAttachment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    date_time: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleAttendee {
    email: Option<String>,
    display_name: Option<String>,
    response_status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GooglePerson {
    email: Option<String>,
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleAttachment {
    file_id: Option<String>,
    title: Option<String>,
    mime_type: Option<String>,
}

impl EventTime {
    /// Timed events carry `dateTime`; all-day events a bare `date`.
    fn parse(&self) -> Option<(DateTime<FixedOffset>, bool)> {
        if let Some(ref dt) = self.date_time {
            return DateTime::parse_from_rfc3339(dt).ok().map(|t| (t, false));
        }
        let date = NaiveDate::parse_from_str(self.date.as_deref()?, "%Y-%m-%d").ok()?;
        let midnight = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?);
        Some((midnight.fixed_offset(), true))
    }
}

impl GoogleEvent {
    fn into_event(self) -> Option<CalendarEvent> {
        if self.status.as_deref() == Some("cancelled") {
            debug!("Skipping cancelled event {}", self.id);
            return None;
        }

        let Some((start, all_day)) = self.start.as_ref().and_then(EventTime::parse) else {
            warn!("Skipping event {} without a usable start time", self.id);
            return None;
        };
        let end = self
            .end
            .as_ref()
            .and_then(EventTime::parse)
            .map(|(end, _)| end)
            .unwrap_or(start);

        let attendees = self
            .attendees
            .into_iter()
            .filter_map(|a| {
                Some(Attendee {
                    email: a.email?,
                    display_name: a.display_name,
                    response: a
                        .response_status
                        .as_deref()
                        .map(ResponseStatus::from)
                        .unwrap_or(ResponseStatus::NeedsAction),
                })
            })
            .collect();

        let creator = self.creator.and_then(|c| c.display_name.or(c.email));

        let attachments = self
            .attachments
            .into_iter()
            .map(|a| Attachment {
                file_id: a.file_id,
                title: a.title.unwrap_or_default(),
                mime_type: a.mime_type.unwrap_or_default(),
            })
            .collect();

        Some(CalendarEvent {
            id: self.id,
            title: self.summary.unwrap_or_else(|| "(no title)".to_string()),
            start,
            end,
            all_day,
            attendees,
            creator,
            attachments,
        })
    }
}
