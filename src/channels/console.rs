//! Console vote surface
//!
//! In-process surface that keeps posted tallies and private replies in
//! memory and logs them. Backs the replay command and tests.

use super::surface::{ChannelError, ChannelResult, VoteSurface};
use crate::polls::intake::VoteInteraction;
use crate::polls::render::TallyEmbed;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

/// A private reply delivered to a voter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrivateReply {
    pub interaction_id: String,
    pub voter_id: String,
    pub text: String,
}

/// Surface that records everything in memory
#[derive(Debug, Default)]
pub struct ConsoleSurface {
    /// Current tally per message ID
    messages: RwLock<HashMap<String, TallyEmbed>>,
    /// Private replies in delivery order
    replies: RwLock<Vec<PrivateReply>>,
    /// Number of in-place edits performed
    edits: RwLock<usize>,
}

impl ConsoleSurface {
    /// Create an empty console surface
    pub fn new() -> Self {
        Self::default()
    }

    /// Current tally shown in a message
    pub fn message(&self, message_id: &str) -> Option<TallyEmbed> {
        self.messages.read().get(message_id).cloned()
    }

    /// Delete a message so later edits fail
    pub fn delete_message(&self, message_id: &str) -> bool {
        self.messages.write().remove(message_id).is_some()
    }

    /// All private replies so far
    pub fn replies(&self) -> Vec<PrivateReply> {
        self.replies.read().clone()
    }

    /// Most recent private reply
    pub fn last_reply(&self) -> Option<PrivateReply> {
        self.replies.read().last().cloned()
    }

    /// Number of in-place edits
    pub fn edit_count(&self) -> usize {
        *self.edits.read()
    }
}

#[async_trait]
impl VoteSurface for ConsoleSurface {
    async fn post_tally(
        &self,
        channel_id: &str,
        embed: &TallyEmbed,
        option_count: usize,
    ) -> ChannelResult<String> {
        let message_id = Uuid::new_v4().to_string();
        self.messages
            .write()
            .insert(message_id.clone(), embed.clone());

        info!(
            channel_id = %channel_id,
            message_id = %message_id,
            options = option_count,
            "Posted vote message"
        );
        Ok(message_id)
    }

    async fn edit_tally(
        &self,
        channel_id: &str,
        message_id: &str,
        embed: &TallyEmbed,
    ) -> ChannelResult<()> {
        let mut messages = self.messages.write();
        let slot = messages
            .get_mut(message_id)
            .ok_or_else(|| ChannelError::MessageNotFound(message_id.to_string()))?;
        *slot = embed.clone();
        drop(messages);

        *self.edits.write() += 1;
        info!(channel_id = %channel_id, message_id = %message_id, "Edited vote message");
        Ok(())
    }

    async fn reply_private(
        &self,
        interaction: &VoteInteraction,
        text: &str,
    ) -> ChannelResult<()> {
        info!(voter_id = %interaction.voter_id, text = %text, "Private reply");
        self.replies.write().push(PrivateReply {
            interaction_id: interaction.interaction_id.clone(),
            voter_id: interaction.voter_id.clone(),
            text: text.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polls::render::{EmbedField, TallyEmbed};

    fn embed(votes: usize) -> TallyEmbed {
        TallyEmbed {
            title: "Vote".to_string(),
            description: "ends soon".to_string(),
            color: 0,
            fields: vec![EmbedField {
                name: format!("Image 1 ({} votes)", votes),
                value: "Prompt: x".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn test_post_and_edit() {
        let surface = ConsoleSurface::new();
        let id = surface.post_tally("chan1", &embed(0), 1).await.unwrap();
        assert_eq!(surface.message(&id), Some(embed(0)));

        surface.edit_tally("chan1", &id, &embed(3)).await.unwrap();
        assert_eq!(surface.message(&id), Some(embed(3)));
        assert_eq!(surface.edit_count(), 1);
    }

    #[tokio::test]
    async fn test_edit_deleted_message_fails() {
        let surface = ConsoleSurface::new();
        let id = surface.post_tally("chan1", &embed(0), 1).await.unwrap();
        assert!(surface.delete_message(&id));

        let err = surface.edit_tally("chan1", &id, &embed(1)).await.unwrap_err();
        assert!(matches!(err, ChannelError::MessageNotFound(_)));
        assert_eq!(surface.edit_count(), 0);
    }

    #[tokio::test]
    async fn test_reply_private_records() {
        let surface = ConsoleSurface::new();
        let interaction = VoteInteraction::new("chan1", "u1", "vote_0");
        surface.reply_private(&interaction, "hello").await.unwrap();

        let reply = surface.last_reply().unwrap();
        assert_eq!(reply.voter_id, "u1");
        assert_eq!(reply.text, "hello");
        assert_eq!(surface.replies().len(), 1);
    }
}
