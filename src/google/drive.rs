//! Google Drive v3 client: exports meeting-note documents attached to events.

use super::{http_client, read_text, send_error, API_TIMEOUT};
use crate::error::{AppError, Result};
use crate::models::{Attachment, CalendarEvent, MeetingNote};
use crate::ports::{CredentialProvider, DocumentSource};
use async_trait::async_trait;
use reqwest::Url;
use std::sync::Arc;
use tracing::{debug, warn};

const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
const GOOGLE_DOC_MIME: &str = "application/vnd.google-apps.document";
const SERVICE: &str = "Google Drive";

/// Title fragments that mark an attachment as generated meeting notes.
const NOTE_TITLE_MARKERS: [&str; 3] = ["notes by gemini", "gemini notes", "by gemini"];

/// Whether an attachment is a Google Doc holding meeting notes.
pub fn is_meeting_note(attachment: &Attachment) -> bool {
    if attachment.mime_type != GOOGLE_DOC_MIME {
        return false;
    }
    let title = attachment.title.to_lowercase();
    NOTE_TITLE_MARKERS.iter().any(|marker| title.contains(marker))
}

pub struct GoogleDriveClient {
    http: reqwest::Client,
    credentials: Arc<dyn CredentialProvider>,
    base_url: String,
}

impl GoogleDriveClient {
    pub fn new(credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        Ok(Self {
            http: http_client(API_TIMEOUT)?,
            credentials,
            base_url: DRIVE_API_BASE.to_string(),
        })
    }

    /// Point the client at another API root.
    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Export a Google Doc as plain text.
    pub async fn export_text(&self, file_id: &str) -> Result<String> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| AppError::Provider(format!("Invalid drive API base: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| AppError::Provider("Drive API base cannot hold a path".to_string()))?
            .pop_if_empty()
            .extend(["files", file_id, "export"]);

        let token = self.credentials.access_token().await?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(&[("mimeType", "text/plain")])
            .send()
            .await
            .map_err(|e| send_error(SERVICE, e))?;

        read_text(SERVICE, response).await
    }
}

#[async_trait]
impl DocumentSource for GoogleDriveClient {
    async fn fetch_notes_for(&self, event: &CalendarEvent) -> Result<Option<MeetingNote>> {
        let mut bodies = Vec::new();

        for attachment in event.attachments.iter().filter(|a| is_meeting_note(a)) {
            let Some(ref file_id) = attachment.file_id else {
                warn!("Notes '{}' on '{}' have no file id", attachment.title, event.title);
                continue;
            };

            match self.export_text(file_id).await {
                Ok(text) => {
                    debug!("Exported '{}' ({} chars)", attachment.title, text.len());
                    bodies.push(text);
                }
                Err(e @ AppError::Authentication(_)) => return Err(e),
                Err(e) => warn!("Failed to export '{}': {}", attachment.title, e),
            }
        }

        if bodies.is_empty() {
            return Ok(None);
        }

        let attendees = event
            .attendees
            .iter()
            .map(|a| a.name().to_string())
            .collect();
        Ok(Some(MeetingNote::new(
            event.title.clone(),
            event.date(),
            attendees,
            bodies.join("\n\n"),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google::StaticToken;
    use crate::models::{Attendee, ResponseStatus};
    use chrono::DateTime;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn doc(file_id: Option<&str>, title: &str) -> Attachment {
        Attachment {
            file_id: file_id.map(String::from),
            title: title.to_string(),
            mime_type: GOOGLE_DOC_MIME.to_string(),
        }
    }

    fn event(attachments: Vec<Attachment>) -> CalendarEvent {
        let start = DateTime::parse_from_rfc3339("2024-06-03T10:00:00+00:00").unwrap();
        CalendarEvent {
            id: "e1".to_string(),
            title: "Design review".to_string(),
            start,
            end: start + chrono::Duration::hours(1),
            all_day: false,
            attendees: vec![Attendee {
                email: "ana@example.com".to_string(),
                display_name: Some("Ana".to_string()),
                response: ResponseStatus::Accepted,
            }],
            creator: None,
            attachments,
        }
    }

    #[test]
    fn test_is_meeting_note() {
        assert!(is_meeting_note(&doc(Some("1"), "Design review - Notes by Gemini")));
        assert!(is_meeting_note(&doc(Some("1"), "Gemini notes: standup")));
        assert!(!is_meeting_note(&doc(Some("1"), "Quarterly plan")));

        let mut pdf = doc(Some("1"), "Notes by Gemini");
        pdf.mime_type = "application/pdf".to_string();
        assert!(!is_meeting_note(&pdf));
    }

    #[tokio::test]
    async fn test_fetch_notes_exports_and_joins_documents() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/doc-a/export"))
            .and(query_param("mimeType", "text/plain"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Decided to ship."))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/doc-b/export"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Follow-ups assigned."))
            .mount(&server)
            .await;

        let client = GoogleDriveClient::new(Arc::new(StaticToken::new("t")))
            .unwrap()
            .with_base_url(server.uri());
        let event = event(vec![
            doc(Some("doc-a"), "Design review - Notes by Gemini"),
            doc(Some("doc-b"), "Design review (part 2) - Notes by Gemini"),
            doc(Some("doc-c"), "Slides"),
        ]);

        let note = client.fetch_notes_for(&event).await.unwrap().unwrap();
        assert_eq!(note.title, "Design review");
        assert_eq!(note.attendees, vec!["Ana".to_string()]);
        assert_eq!(note.body, "Decided to ship.\n\nFollow-ups assigned.");
    }

    #[tokio::test]
    async fn test_event_without_notes_yields_none() {
        let client = GoogleDriveClient::new(Arc::new(StaticToken::new("t")))
            .unwrap()
            .with_base_url("http://127.0.0.1:9");
        let note = client
            .fetch_notes_for(&event(vec![doc(Some("x"), "Agenda")]))
            .await
            .unwrap();
        assert!(note.is_none());
    }

    #[tokio::test]
    async fn test_failed_export_is_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let client = GoogleDriveClient::new(Arc::new(StaticToken::new("t")))
            .unwrap()
            .with_base_url(server.uri());
        let note = client
            .fetch_notes_for(&event(vec![doc(Some("gone"), "Notes by Gemini")]))
            .await
            .unwrap();
        assert!(note.is_none());
    }
}
