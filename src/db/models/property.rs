//! Commercial property listings.

use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};

use crate::utils::csv::CsvRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PropertyType {
    Office,
    Retail,
    Industrial,
    Warehouse,
    MixedUse,
}

impl std::fmt::Display for PropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyType::Office => write!(f, "office"),
            PropertyType::Retail => write!(f, "retail"),
            PropertyType::Industrial => write!(f, "industrial"),
            PropertyType::Warehouse => write!(f, "warehouse"),
            PropertyType::MixedUse => write!(f, "mixed_use"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PropertyStatus {
    Available,
    Occupied,
    Maintenance,
}

impl std::fmt::Display for PropertyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyStatus::Available => write!(f, "available"),
            PropertyStatus::Occupied => write!(f, "occupied"),
            PropertyStatus::Maintenance => write!(f, "maintenance"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Property {
    pub id: String,
    pub title: String,
    pub address: String,
    pub city: String,
    pub property_type: PropertyType,
    pub size_sqft: f64,
    /// Asking monthly rent
    pub price: f64,
    pub status: PropertyStatus,
    pub amenities: Json<Vec<String>>,
    /// Image and video URLs
    pub media: Json<Vec<String>>,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Property {
    pub fn price_per_sqft(&self) -> f64 {
        if self.size_sqft > 0.0 {
            self.price / self.size_sqft
        } else {
            0.0
        }
    }
}

impl CsvRecord for Property {
    fn headers() -> &'static [&'static str] {
        &[
            "id",
            "title",
            "address",
            "city",
            "type",
            "size_sqft",
            "price",
            "status",
            "amenities",
            "created_at",
        ]
    }

    fn fields(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.title.clone(),
            self.address.clone(),
            self.city.clone(),
            self.property_type.to_string(),
            self.size_sqft.to_string(),
            format!("{:.2}", self.price),
            self.status.to_string(),
            self.amenities.0.join("; "),
            self.created_at.clone(),
        ]
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePropertyRequest {
    pub title: String,
    pub address: String,
    pub city: String,
    pub property_type: PropertyType,
    pub size_sqft: f64,
    pub price: f64,
    pub status: Option<PropertyStatus>,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub media: Vec<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdatePropertyRequest {
    pub title: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub property_type: Option<PropertyType>,
    pub size_sqft: Option<f64>,
    pub price: Option<f64>,
    pub amenities: Option<Vec<String>>,
    pub media: Option<Vec<String>>,
    pub description: Option<String>,
}

/// Normalize an amenity list: trim, drop blanks and case-insensitive duplicates
pub fn normalize_amenities(amenities: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    amenities
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .filter(|a| seen.insert(a.to_lowercase()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_amenities() {
        let input = vec![
            " Parking ".to_string(),
            "parking".to_string(),
            "".to_string(),
            "Loading dock".to_string(),
        ];
        assert_eq!(normalize_amenities(&input), vec!["Parking", "Loading dock"]);
    }

    #[test]
    fn test_property_type_serde() {
        let t: PropertyType = serde_json::from_str("\"mixed_use\"").unwrap();
        assert_eq!(t, PropertyType::MixedUse);
        assert_eq!(t.to_string(), "mixed_use");
    }

    #[test]
    fn test_price_per_sqft_handles_zero_size() {
        let mut p = Property {
            id: "p".into(),
            title: "t".into(),
            address: "a".into(),
            city: "c".into(),
            property_type: PropertyType::Office,
            size_sqft: 2000.0,
            price: 5000.0,
            status: PropertyStatus::Available,
            amenities: Json(vec![]),
            media: Json(vec![]),
            description: None,
            created_at: String::new(),
            updated_at: String::new(),
        };
        assert!((p.price_per_sqft() - 2.5).abs() < f64::EPSILON);
        p.size_sqft = 0.0;
        assert_eq!(p.price_per_sqft(), 0.0);
    }
}
