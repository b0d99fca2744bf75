use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::user::UserSummary;
use crate::auth::Viewer;
use crate::schema::comments;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentStatus {
    Pending,
    Approved,
    Rejected,
    Spam,
}

impl CommentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommentStatus::Pending => "pending",
            CommentStatus::Approved => "approved",
            CommentStatus::Rejected => "rejected",
            CommentStatus::Spam => "spam",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(CommentStatus::Pending),
            "approved" => Some(CommentStatus::Approved),
            "rejected" => Some(CommentStatus::Rejected),
            "spam" => Some(CommentStatus::Spam),
            _ => None,
        }
    }
}

/// Moderation transition table. Pending comments can go anywhere,
/// rejected ones can be approved, anything can be marked spam, and
/// spam can be unmarked to any other status. Self-transitions are not
/// legal moves.
pub fn is_valid_transition(from: CommentStatus, to: CommentStatus) -> bool {
    use CommentStatus::*;
    match (from, to) {
        (Pending, Approved | Rejected | Spam) => true,
        (Rejected, Approved | Spam) => true,
        (Approved, Spam) => true,
        (Spam, to) => to != Spam,
        _ => false,
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = comments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Comment {
    pub id: Uuid,
    pub content: String,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub status: String,
    pub is_edited: bool,
    pub likes_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    pub fn is_approved(&self) -> bool {
        self.status == CommentStatus::Approved.as_str()
    }

    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = comments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewComment {
    pub id: Uuid,
    pub content: String,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub status: String,
    pub is_edited: bool,
    pub likes_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewComment {
    pub fn new(
        post_id: Uuid,
        author_id: Uuid,
        parent_id: Option<Uuid>,
        content: String,
        now: DateTime<Utc>,
    ) -> Self {
        NewComment {
            id: Uuid::new_v4(),
            content,
            post_id,
            author_id,
            parent_id,
            status: CommentStatus::Approved.as_str().to_string(),
            is_edited: false,
            likes_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A comment with its visible reply subtree attached
#[derive(Debug, Serialize)]
pub struct CommentNode {
    pub id: Uuid,
    pub content: String,
    pub post_id: Uuid,
    pub author: UserSummary,
    pub parent_id: Option<Uuid>,
    pub status: String,
    pub is_edited: bool,
    pub likes_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub reply_count: usize,
    pub replies: Vec<CommentNode>,
}

/// Comment visibility: anonymous callers see approved comments only,
/// signed-in callers additionally see their own, staff see everything.
pub fn comment_visible(viewer: &Viewer, comment: &Comment) -> bool {
    match viewer {
        Viewer::Anonymous => comment.is_approved(),
        Viewer::User { is_staff: true, .. } => true,
        Viewer::User { id, .. } => comment.is_approved() || comment.author_id == *id,
    }
}

/// Build the per-post comment forest from a flat, creation-ordered row
/// set. Comments are grouped by parent id into an arena first, then
/// subtrees are attached root-first, so no live object graph or cycle
/// handling is involved. Replies whose ancestors are filtered out by
/// the visibility rule are dropped with them.
pub fn build_comment_tree(rows: Vec<(Comment, UserSummary)>, viewer: &Viewer) -> Vec<CommentNode> {
    let mut roots: Vec<(Comment, UserSummary)> = Vec::new();
    let mut children: HashMap<Uuid, Vec<(Comment, UserSummary)>> = HashMap::new();

    for (comment, author) in rows {
        if !comment_visible(viewer, &comment) {
            continue;
        }
        match comment.parent_id {
            None => roots.push((comment, author)),
            Some(parent) => children.entry(parent).or_default().push((comment, author)),
        }
    }

    roots
        .into_iter()
        .map(|(comment, author)| attach_replies(comment, author, &mut children))
        .collect()
}

/// Ancestor chain of a comment, root-first. Parent assignment only ever
/// points at pre-existing comments, so the walk terminates without
/// cycle detection.
pub fn ancestor_chain(by_id: &HashMap<Uuid, Comment>, id: Uuid) -> Vec<Uuid> {
    let mut chain = Vec::new();
    let mut current = by_id.get(&id).and_then(|c| c.parent_id);
    while let Some(parent_id) = current {
        chain.push(parent_id);
        current = by_id.get(&parent_id).and_then(|c| c.parent_id);
    }
    chain.reverse();
    chain
}

/// Full descendant set of a comment in pre-order
pub fn descendants(children: &HashMap<Uuid, Vec<Uuid>>, id: Uuid) -> Vec<Uuid> {
    let mut out = Vec::new();
    let mut stack: Vec<Uuid> = children.get(&id).cloned().unwrap_or_default();
    stack.reverse();
    while let Some(next) = stack.pop() {
        out.push(next);
        if let Some(kids) = children.get(&next) {
            for kid in kids.iter().rev() {
                stack.push(*kid);
            }
        }
    }
    out
}

fn attach_replies(
    comment: Comment,
    author: UserSummary,
    children: &mut HashMap<Uuid, Vec<(Comment, UserSummary)>>,
) -> CommentNode {
    let replies: Vec<CommentNode> = children
        .remove(&comment.id)
        .unwrap_or_default()
        .into_iter()
        .map(|(reply, reply_author)| attach_replies(reply, reply_author, children))
        .collect();

    CommentNode {
        id: comment.id,
        content: comment.content,
        post_id: comment.post_id,
        author,
        parent_id: comment.parent_id,
        status: comment.status,
        is_edited: comment.is_edited,
        likes_count: comment.likes_count,
        created_at: comment.created_at,
        updated_at: comment.updated_at,
        reply_count: replies.len(),
        replies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CommentStatus::*;

    fn summary(id: Uuid) -> UserSummary {
        UserSummary {
            id,
            username: format!("user-{}", id),
            display_name: String::new(),
            avatar: None,
        }
    }

    fn comment(
        post_id: Uuid,
        author_id: Uuid,
        parent_id: Option<Uuid>,
        status: CommentStatus,
        seq: i64,
    ) -> Comment {
        Comment {
            id: Uuid::new_v4(),
            content: format!("comment {}", seq),
            post_id,
            author_id,
            parent_id,
            status: status.as_str().to_string(),
            is_edited: false,
            likes_count: 0,
            created_at: Utc::now() + chrono::Duration::seconds(seq),
            updated_at: Utc::now() + chrono::Duration::seconds(seq),
        }
    }

    #[test]
    fn transitions_from_pending() {
        assert!(is_valid_transition(Pending, Approved));
        assert!(is_valid_transition(Pending, Rejected));
        assert!(is_valid_transition(Pending, Spam));
    }

    #[test]
    fn rejected_can_be_approved_or_spammed() {
        assert!(is_valid_transition(Rejected, Approved));
        assert!(is_valid_transition(Rejected, Spam));
        assert!(!is_valid_transition(Rejected, Pending));
    }

    #[test]
    fn approved_can_only_become_spam() {
        assert!(is_valid_transition(Approved, Spam));
        assert!(!is_valid_transition(Approved, Pending));
        assert!(!is_valid_transition(Approved, Rejected));
    }

    #[test]
    fn spam_can_be_unmarked_to_anything_else() {
        assert!(is_valid_transition(Spam, Pending));
        assert!(is_valid_transition(Spam, Approved));
        assert!(is_valid_transition(Spam, Rejected));
        assert!(!is_valid_transition(Spam, Spam));
    }

    #[test]
    fn self_transitions_are_invalid() {
        assert!(!is_valid_transition(Approved, Approved));
        assert!(!is_valid_transition(Pending, Pending));
    }

    #[test]
    fn tree_nests_reply_under_parent() {
        let post = Uuid::new_v4();
        let author = Uuid::new_v4();
        let top = comment(post, author, None, Approved, 0);
        let reply = comment(post, author, Some(top.id), Approved, 1);

        let tree = build_comment_tree(
            vec![(top.clone(), summary(author)), (reply.clone(), summary(author))],
            &Viewer::Anonymous,
        );

        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].id, top.id);
        assert_eq!(tree[0].reply_count, 1);
        assert_eq!(tree[0].replies.len(), 1);
        assert_eq!(tree[0].replies[0].id, reply.id);
        assert!(tree[0].replies[0].replies.is_empty());
    }

    #[test]
    fn anonymous_viewer_sees_only_approved() {
        let post = Uuid::new_v4();
        let author = Uuid::new_v4();
        let approved = comment(post, author, None, Approved, 0);
        let pending = comment(post, author, None, Pending, 1);

        let tree = build_comment_tree(
            vec![(approved.clone(), summary(author)), (pending, summary(author))],
            &Viewer::Anonymous,
        );

        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].id, approved.id);
    }

    #[test]
    fn author_sees_own_unapproved_comment() {
        let post = Uuid::new_v4();
        let author = Uuid::new_v4();
        let other = Uuid::new_v4();
        let own_pending = comment(post, author, None, Pending, 0);
        let foreign_pending = comment(post, other, None, Pending, 1);

        let viewer = Viewer::User {
            id: author,
            is_staff: false,
        };
        let tree = build_comment_tree(
            vec![
                (own_pending.clone(), summary(author)),
                (foreign_pending, summary(other)),
            ],
            &viewer,
        );

        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].id, own_pending.id);
    }

    #[test]
    fn staff_sees_everything() {
        let post = Uuid::new_v4();
        let author = Uuid::new_v4();
        let rows = vec![
            (comment(post, author, None, Pending, 0), summary(author)),
            (comment(post, author, None, Spam, 1), summary(author)),
            (comment(post, author, None, Rejected, 2), summary(author)),
        ];

        let viewer = Viewer::User {
            id: Uuid::new_v4(),
            is_staff: true,
        };
        assert_eq!(build_comment_tree(rows, &viewer).len(), 3);
    }

    #[test]
    fn replies_under_invisible_parent_are_dropped() {
        let post = Uuid::new_v4();
        let author = Uuid::new_v4();
        let hidden_top = comment(post, author, None, Rejected, 0);
        let orphan_reply = comment(post, author, Some(hidden_top.id), Approved, 1);

        let tree = build_comment_tree(
            vec![(hidden_top, summary(author)), (orphan_reply, summary(author))],
            &Viewer::Anonymous,
        );
        assert!(tree.is_empty());
    }

    #[test]
    fn ancestor_chain_is_root_first() {
        let post = Uuid::new_v4();
        let author = Uuid::new_v4();
        let root = comment(post, author, None, Approved, 0);
        let mid = comment(post, author, Some(root.id), Approved, 1);
        let leaf = comment(post, author, Some(mid.id), Approved, 2);

        let by_id: HashMap<Uuid, Comment> = [root.clone(), mid.clone(), leaf.clone()]
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        assert_eq!(ancestor_chain(&by_id, leaf.id), vec![root.id, mid.id]);
        assert!(ancestor_chain(&by_id, root.id).is_empty());
    }

    #[test]
    fn descendants_are_preorder() {
        let root = Uuid::new_v4();
        let a = Uuid::new_v4();
        let a1 = Uuid::new_v4();
        let b = Uuid::new_v4();

        let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        children.insert(root, vec![a, b]);
        children.insert(a, vec![a1]);

        assert_eq!(descendants(&children, root), vec![a, a1, b]);
        assert!(descendants(&children, b).is_empty());
    }

    #[test]
    fn deep_nesting_is_preserved() {
        let post = Uuid::new_v4();
        let author = Uuid::new_v4();
        let c1 = comment(post, author, None, Approved, 0);
        let c2 = comment(post, author, Some(c1.id), Approved, 1);
        let c3 = comment(post, author, Some(c2.id), Approved, 2);

        let tree = build_comment_tree(
            vec![
                (c1.clone(), summary(author)),
                (c2.clone(), summary(author)),
                (c3.clone(), summary(author)),
            ],
            &Viewer::Anonymous,
        );

        assert_eq!(tree[0].replies[0].replies[0].id, c3.id);
    }
}
