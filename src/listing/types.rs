//! Domain types for the server directory. The sync layer treats all of
//! these as opaque JSON payloads.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One listed private server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
  pub id: String,
  pub name: String,
  pub url: String,
  pub rate: String,
  pub chronicle: String,
  pub opening_date: NaiveDate,
  pub is_vip: bool,
  pub created_at: DateTime<Utc>,
}

/// Listing as submitted by an admin; id and creation time are assigned on
/// write.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDraft {
  pub name: String,
  pub url: String,
  pub rate: String,
  pub chronicle: String,
  pub opening_date: NaiveDate,
  pub is_vip: bool,
}

/// Promotional image metadata, used for both the wallpaper and the side
/// banner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoImage {
  pub url: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub link_url: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub valid_until: Option<NaiveDate>,
  pub uploaded_at: DateTime<Utc>,
}

/// Known experience-rate tiers, in display order.
pub const RATES: &[&str] = &[
  "x1", "x3", "x5", "x7", "x10", "x50", "x100", "x1000", "x1200", "x10000", "x50000", "x100000",
];

/// Known chronicle versions.
pub const CHRONICLES: &[&str] = &[
  "Interlude",
  "High Five",
  "Essence",
  "Interlude+",
  "Classic",
  "C4",
  "C6",
  "Final",
  "Epilogue",
  "GoD",
  "Salvation",
  "C5",
  "Freya",
  "Ertheia",
  "Helios",
  "Orfen",
  "Fafurion",
  "Homunculus",
  "C3",
  "G.Crusade",
  "Lindvior",
  "Odyssey",
];

/// Display order: VIP listings first, then ascending opening date.
pub fn sort_listing(servers: &mut [Server]) {
  servers.sort_by(|a, b| {
    b.is_vip
      .cmp(&a.is_vip)
      .then(a.opening_date.cmp(&b.opening_date))
  });
}

#[cfg(test)]
mod tests {
  use super::*;

  fn server(name: &str, opening: &str, vip: bool) -> Server {
    Server {
      id: name.to_string(),
      name: name.to_string(),
      url: format!("https://{}.example", name),
      rate: "x10".to_string(),
      chronicle: "Interlude".to_string(),
      opening_date: opening.parse().unwrap(),
      is_vip: vip,
      created_at: Utc::now(),
    }
  }

  #[test]
  fn test_vip_first_then_opening_date() {
    let mut servers = vec![
      server("late", "2025-09-01", false),
      server("vip-late", "2025-08-20", true),
      server("early", "2025-07-01", false),
      server("vip-early", "2025-08-01", true),
    ];
    sort_listing(&mut servers);

    let names: Vec<&str> = servers.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["vip-early", "vip-late", "early", "late"]);
  }

  #[test]
  fn test_server_round_trips_with_camel_case_fields() {
    let s = server("a", "2025-07-01", true);
    let json = serde_json::to_value(&s).unwrap();
    assert!(json.get("openingDate").is_some());
    assert!(json.get("isVip").is_some());
    assert!(json.get("createdAt").is_some());

    let back: Server = serde_json::from_value(json).unwrap();
    assert_eq!(back, s);
  }

  #[test]
  fn test_promo_image_omits_absent_optionals() {
    let img = PromoImage {
      url: "https://cdn.example/wallpaper-1.png".to_string(),
      link_url: None,
      valid_until: None,
      uploaded_at: Utc::now(),
    };
    let json = serde_json::to_value(&img).unwrap();
    assert!(json.get("linkUrl").is_none());
    assert!(json.get("validUntil").is_none());
  }
}
