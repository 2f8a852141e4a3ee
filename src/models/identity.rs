use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Palette the presence colors are drawn from. Order matters: changing it
/// changes every user's color.
pub const PRESENCE_PALETTE: [&str; 12] = [
    "#E57373", "#F06292", "#BA68C8", "#9575CD",
    "#7986CB", "#64B5F6", "#4DB6AC", "#81C784",
    "#DCE775", "#FFD54F", "#FFB74D", "#A1887F",
];

/// Authenticated user behind a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Identity {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub color: String,
}

impl Identity {
    pub fn new(id: impl Into<String>, name: impl Into<String>, email: Option<String>) -> Self {
        let id = id.into();
        let color = presence_color(&id).to_string();
        Self {
            id,
            name: name.into(),
            email,
            color,
        }
    }
}

/// Stable color for a user id: 31-multiplier hash over the UTF-16 code
/// units (the JVM `String.hashCode`), so other services pick the same color.
pub fn presence_color(user_id: &str) -> &'static str {
    let hash = user_id
        .encode_utf16()
        .fold(0i32, |acc, unit| acc.wrapping_mul(31).wrapping_add(i32::from(unit)));
    let index = (hash.unsigned_abs() as usize) % PRESENCE_PALETTE.len();
    PRESENCE_PALETTE[index]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_user_gets_same_color() {
        assert_eq!(presence_color("user-42"), presence_color("user-42"));
        let a = Identity::new("user-42", "Ada", None);
        let b = Identity::new("user-42", "Ada Lovelace", Some("ada@example.com".into()));
        assert_eq!(a.color, b.color);
    }

    #[test]
    fn color_comes_from_palette() {
        for id in ["", "a", "bob", "7f1c2e9a-0000-4000-8000-000000000000"] {
            assert!(PRESENCE_PALETTE.contains(&presence_color(id)));
        }
    }

    #[test]
    fn hash_runs_over_utf16_code_units() {
        // "\u{1F600}" is the surrogate pair D83D DE00: 0xD83D * 31 + 0xDE00 = 1772899
        assert_eq!(presence_color("\u{1F600}"), PRESENCE_PALETTE[1_772_899 % 12]);
        // "ab" = 97 * 31 + 98 = 3105
        assert_eq!(presence_color("ab"), PRESENCE_PALETTE[3105 % 12]);
    }

    #[test]
    fn empty_id_maps_to_first_entry() {
        assert_eq!(presence_color(""), PRESENCE_PALETTE[0]);
    }

    #[test]
    fn email_is_omitted_when_absent() {
        let json = serde_json::to_value(Identity::new("u1", "Una", None)).unwrap();
        assert!(json.get("email").is_none());
        assert_eq!(json["id"], "u1");
    }
}
