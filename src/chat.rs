//! Outbound chat platform client.
//!
//! Implements the engine's `Transport` trait against the platform's
//! REST API: messages are created and edited with an embed, a PNG
//! attachment, and a row of interactive controls. Message keys are
//! `channel:message` pairs so every method is self-addressing.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

use crate::review::{ChannelContext, FinalReport, Notice, RenderRequest, SessionKey, Transport};

const CHAT_API: &str = "https://discord.com/api/v10";
const ATTACHMENT_NAME: &str = "review.png";

const ACTION_ROW: u8 = 1;
const BUTTON: u8 = 2;
const STYLE_PRIMARY: u8 = 1;
const STYLE_SECONDARY: u8 = 2;
const STYLE_SUCCESS: u8 = 3;
const STYLE_DANGER: u8 = 4;

#[derive(Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    bot_token: String,
}

#[derive(Debug, Serialize)]
struct MessagePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    embeds: Vec<Embed>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    components: Vec<ActionRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attachments: Option<Vec<AttachmentRef>>,
}

impl MessagePayload {
    fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            embeds: Vec::new(),
            components: Vec::new(),
            attachments: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct Embed {
    title: String,
    description: String,
    image: EmbedImage,
}

#[derive(Debug, Serialize)]
struct EmbedImage {
    url: String,
}

#[derive(Debug, Serialize)]
struct ActionRow {
    #[serde(rename = "type")]
    kind: u8,
    components: Vec<Button>,
}

#[derive(Debug, Serialize)]
struct Button {
    #[serde(rename = "type")]
    kind: u8,
    style: u8,
    label: String,
    custom_id: String,
}

impl Button {
    fn new(style: u8, label: &str, custom_id: impl Into<String>) -> Self {
        Self { kind: BUTTON, style, label: label.to_string(), custom_id: custom_id.into() }
    }
}

/// Declares the uploaded file as attachment 0 so the embed can
/// reference it; on edits this also drops any previous attachment.
#[derive(Debug, Serialize)]
struct AttachmentRef {
    id: u8,
    filename: &'static str,
}

/// Stripped-down edit that removes the interactive controls.
#[derive(Debug, Serialize)]
struct RetirePayload {
    components: Vec<ActionRow>,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    id: String,
    channel_id: String,
}

/// Builds the review message body: embed with the status line and the
/// current image, plus the control buttons.
fn review_payload(request: &RenderRequest) -> MessagePayload {
    let current = request.image_index;
    MessagePayload {
        content: None,
        embeds: vec![Embed {
            title: request.title.clone(),
            description: format!("{}\n{}", request.position_line(), request.status_line),
            image: EmbedImage { url: format!("attachment://{ATTACHMENT_NAME}") },
        }],
        components: vec![
            ActionRow {
                kind: ACTION_ROW,
                components: vec![
                    Button::new(STYLE_SECONDARY, "⬅️ Previous", "previous"),
                    Button::new(STYLE_SECONDARY, "Next ➡️", "next"),
                ],
            },
            ActionRow {
                kind: ACTION_ROW,
                components: vec![
                    Button::new(STYLE_SUCCESS, "✅ Pass", "approve"),
                    Button::new(STYLE_DANGER, "❌ Fail", "reject"),
                    Button::new(STYLE_PRIMARY, "🔄 Retouch Again", format!("retouch_again:{current}")),
                    Button::new(STYLE_SECONDARY, "🛑 Cancel", "cancel"),
                ],
            },
        ],
        attachments: Some(vec![AttachmentRef { id: 0, filename: ATTACHMENT_NAME }]),
    }
}

fn split_key(key: &SessionKey) -> Result<(&str, &str)> {
    key.0
        .split_once(':')
        .ok_or_else(|| anyhow!("malformed message key: {}", key))
}

fn join_key(channel: &str, message: &str) -> SessionKey {
    SessionKey(format!("{channel}:{message}"))
}

impl ChatClient {
    pub fn new(bot_token: String) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("retoucher/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("failed to build HTTP client");
        Self { client, bot_token }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        payload: &MessagePayload,
        image: Option<&[u8]>,
    ) -> Result<MessageResponse> {
        let request = request.header(
            reqwest::header::AUTHORIZATION,
            format!("Bot {}", self.bot_token),
        );

        let request = match image {
            Some(bytes) => {
                let json = serde_json::to_string(payload)
                    .context("failed to serialize message payload")?;
                let part = Part::bytes(bytes.to_vec())
                    .file_name(ATTACHMENT_NAME)
                    .mime_str("image/png")
                    .context("failed to build attachment part")?;
                let form = Form::new().text("payload_json", json).part("files[0]", part);
                request.multipart(form)
            }
            None => request.json(payload),
        };

        let response = request.send().await.context("failed to send chat request")?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Chat API error: {} - {}", status, body));
        }
        response
            .json()
            .await
            .context("failed to parse chat response")
    }

    async fn create_message(
        &self,
        channel: &str,
        payload: &MessagePayload,
        image: Option<&[u8]>,
    ) -> Result<MessageResponse> {
        let request = self
            .client
            .post(format!("{}/channels/{}/messages", CHAT_API, channel));
        self.send(request, payload, image).await
    }

    async fn edit_message(
        &self,
        channel: &str,
        message: &str,
        payload: &MessagePayload,
        image: Option<&[u8]>,
    ) -> Result<MessageResponse> {
        let request = self
            .client
            .patch(format!("{}/channels/{}/messages/{}", CHAT_API, channel, message));
        self.send(request, payload, image).await
    }
}

#[async_trait]
impl Transport for ChatClient {
    async fn announce_processing(
        &self,
        channel: &ChannelContext,
        image_count: usize,
    ) -> Result<SessionKey> {
        let payload = MessagePayload::text(format!(
            "🔄 Processing {} image(s)... This may take a moment.",
            image_count
        ));
        let message = self.create_message(&channel.0, &payload, None).await?;
        Ok(join_key(&message.channel_id, &message.id))
    }

    async fn publish_review(
        &self,
        channel: &ChannelContext,
        placeholder: Option<&SessionKey>,
        request: &RenderRequest,
    ) -> Result<SessionKey> {
        let payload = review_payload(request);
        match placeholder {
            // The placeholder turns into the review message in place.
            Some(key) => {
                let (chan, message) = split_key(key)?;
                self.edit_message(chan, message, &payload, Some(&request.image_bytes))
                    .await?;
                Ok(key.clone())
            }
            None => {
                let message = self
                    .create_message(&channel.0, &payload, Some(&request.image_bytes))
                    .await?;
                Ok(join_key(&message.channel_id, &message.id))
            }
        }
    }

    async fn render(&self, key: &SessionKey, request: &RenderRequest) -> Result<()> {
        let (channel, message) = split_key(key)?;
        self.edit_message(channel, message, &review_payload(request), Some(&request.image_bytes))
            .await?;
        Ok(())
    }

    async fn notify(&self, key: &SessionKey, notice: &Notice) -> Result<()> {
        let (channel, _) = split_key(key)?;
        self.create_message(channel, &MessagePayload::text(notice.to_string()), None)
            .await?;
        Ok(())
    }

    async fn announce(&self, channel: &ChannelContext, text: &str) -> Result<()> {
        self.create_message(&channel.0, &MessagePayload::text(text), None)
            .await?;
        Ok(())
    }

    async fn report(&self, channel: &ChannelContext, report: &FinalReport) -> Result<()> {
        self.create_message(&channel.0, &MessagePayload::text(report.summary()), None)
            .await?;
        Ok(())
    }

    async fn retire_render(&self, key: &SessionKey) -> Result<()> {
        let (channel, message) = split_key(key)?;
        let response = self
            .client
            .patch(format!("{}/channels/{}/messages/{}", CHAT_API, channel, message))
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bot {}", self.bot_token),
            )
            .json(&RetirePayload { components: Vec::new() })
            .send()
            .await
            .context("failed to send retire request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Chat API error: {} - {}", status, body));
        }
        Ok(())
    }
}
