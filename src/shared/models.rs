/**
 * Community Data Model
 *
 * Profiles, posts, events, connections and recommendations as they are
 * stored in the remote document database and in the local cache.
 *
 * Entities that can be shown before the remote service confirmed them carry a
 * `pending` flag. The flag is local-only state and is never written to the
 * remote service.
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Data category with its own cached snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Profile,
    Posts,
    Events,
    Connections,
    Recommendations,
}

impl Category {
    /// Every category, in dashboard load order
    pub const ALL: [Category; 5] = [
        Category::Profile,
        Category::Posts,
        Category::Events,
        Category::Connections,
        Category::Recommendations,
    ];

    /// Storage name of the category
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Profile => "profile",
            Category::Posts => "posts",
            Category::Events => "events",
            Category::Connections => "connections",
            Category::Recommendations => "recommendations",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Member profile, stored in the `users` collection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(default)]
    pub is_profile_complete: bool,
}

impl UserProfile {
    /// Placeholder profile created for accounts without a profile document
    pub fn basic(uid: &str, email: &str, display_name: Option<&str>) -> Self {
        let mut parts = display_name.unwrap_or("").split_whitespace();
        let first_name = parts.next().unwrap_or("User").to_string();
        let last_name = parts.collect::<Vec<_>>().join(" ");
        Self {
            uid: uid.to_string(),
            email: email.to_string(),
            first_name,
            last_name,
            photo_url: None,
            headline: None,
            is_profile_complete: false,
        }
    }

    /// "First Last", trimmed
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

/// A like on a post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A comment on a post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_photo: Option<String>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing)]
    pub pending: bool,
}

/// Draft of a post, before the remote service assigned an id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    pub author_id: String,
    #[serde(default)]
    pub author_name: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaKind>,
}

/// Kind of media attached to a post
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

/// A post in the feed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub author_id: String,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaKind>,
    #[serde(default)]
    pub likes: Vec<Like>,
    #[serde(default)]
    pub likes_count: i64,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub comments_count: i64,
    pub created_at: DateTime<Utc>,
    /// Whether the signed-in member liked this post
    #[serde(default)]
    pub is_liked: bool,
    #[serde(default)]
    pub pending: bool,
}

impl Post {
    /// Local, unconfirmed post built from a draft
    pub fn pending_from(local_id: &str, draft: &NewPost, created_at: DateTime<Utc>) -> Self {
        Self {
            id: local_id.to_string(),
            author_id: draft.author_id.clone(),
            author_name: draft.author_name.clone(),
            content: draft.content.clone(),
            media_url: draft.media_url.clone(),
            media_type: draft.media_type,
            likes: Vec::new(),
            likes_count: 0,
            comments: Vec::new(),
            comments_count: 0,
            created_at,
            is_liked: false,
            pending: true,
        }
    }

    /// Whether `user_id` appears among the likes
    pub fn liked_by(&self, user_id: &str) -> bool {
        self.likes.iter().any(|like| like.user_id == user_id)
    }
}

/// Someone attending an event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A community event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub event_date: DateTime<Utc>,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub organizer_id: String,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
    #[serde(default)]
    pub attendees_count: i64,
    #[serde(default)]
    pub is_attending: bool,
    #[serde(default)]
    pub pending: bool,
}

/// Connection status between two members
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Pending,
    Connected,
}

/// Public card of the connected member
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemberCard {
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

/// Connection between the signed-in member and another member
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: String,
    pub user_id: String,
    pub connected_user_id: String,
    pub status: ConnectionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<MemberCard>,
    #[serde(default)]
    pub pending: bool,
}

/// Suggested member to connect with
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    /// The recommended member's user id
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_reason: Option<String>,
}

impl Recommendation {
    /// Card shown on the connection created from this recommendation
    pub fn card(&self) -> MemberCard {
        MemberCard {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            headline: Some(
                self.headline
                    .clone()
                    .unwrap_or_else(|| "Community Member".to_string()),
            ),
            photo_url: self.photo_url.clone(),
        }
    }
}
