//! Trip pins for the map tab.
//!
//! Every distinct trip location is geocoded once through the geocoder's
//! single-match lookup. Answers are cached per location; a lookup reissued
//! for the same location overtakes the older one, whose answer is dropped.

use std::collections::{HashMap, HashSet};

use geojson::{feature, Feature, FeatureCollection, Geometry, JsonObject, JsonValue, Value};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::sequence::{SequenceGuard, Ticket};
use crate::trip::{Trip, TripId};

/// Where the map opens when no trip could be pinned.
pub const DEFAULT_CENTER: Coordinates = Coordinates {
    latitude: 41.9,
    longitude: 12.5,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return None;
        }
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return None;
        }
        Some(Self {
            latitude,
            longitude,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationLookup {
    pub location: String,
    pub ticket: Ticket,
}

#[derive(Debug, Default)]
pub struct MapPins {
    /// `None` records a location the geocoder had no match for.
    resolved: HashMap<String, Option<Coordinates>>,
    lookups: HashMap<String, SequenceGuard>,
}

impl MapPins {
    /// Lookups needed so that every location in `locations` is known. Blank
    /// and already resolved locations are skipped; repeats are asked once.
    pub fn plan<'a>(&mut self, locations: impl IntoIterator<Item = &'a str>) -> Vec<LocationLookup> {
        let mut seen = HashSet::new();
        let mut lookups = Vec::new();
        for location in locations {
            let location = location.trim();
            if location.is_empty()
                || self.resolved.contains_key(location)
                || !seen.insert(location)
            {
                continue;
            }
            let ticket = self.lookups.entry(location.to_string()).or_default().issue();
            lookups.push(LocationLookup {
                location: location.to_string(),
                ticket,
            });
        }
        lookups
    }

    /// Applies a lookup answer. Failures are logged and left uncached so the
    /// next visit asks again.
    pub fn apply(
        &mut self,
        location: &str,
        ticket: Ticket,
        result: Result<Option<Coordinates>, AppError>,
    ) -> bool {
        let settled = self
            .lookups
            .get_mut(location)
            .is_some_and(|guard| guard.settle(ticket));
        if !settled {
            debug!(location, %ticket, "discarding stale location lookup");
            return false;
        }
        self.lookups.remove(location);

        match result {
            Ok(coordinates) => {
                if coordinates.is_none() {
                    debug!(location, "geocoder found no match");
                }
                self.resolved.insert(location.to_string(), coordinates);
                true
            }
            Err(e) => {
                warn!(location, %ticket, error = %e, "location lookup failed");
                false
            }
        }
    }

    #[must_use]
    pub fn coordinates(&self, location: &str) -> Option<Coordinates> {
        self.resolved.get(location.trim()).copied().flatten()
    }

    #[must_use]
    pub fn is_locating(&self) -> bool {
        self.lookups.values().any(SequenceGuard::in_flight)
    }

    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.resolved.len()
    }
}

#[derive(Debug, Deserialize)]
struct GeocoderMatch {
    #[serde(default)]
    lat: Option<String>,
    #[serde(default)]
    lon: Option<String>,
}

/// Reads the first match of a lookup. The geocoder sends coordinates as
/// decimal strings; an empty list, or a match whose coordinates do not parse,
/// is `None`.
pub fn parse_lookup_response(body: &[u8]) -> Result<Option<Coordinates>, serde_json::Error> {
    let matches: Vec<GeocoderMatch> = serde_json::from_slice(body)?;
    let Some(first) = matches.into_iter().next() else {
        return Ok(None);
    };
    let latitude = first.lat.as_deref().and_then(|v| v.trim().parse::<f64>().ok());
    let longitude = first.lon.as_deref().and_then(|v| v.trim().parse::<f64>().ok());
    let coordinates = latitude.zip(longitude).and_then(|(lat, lon)| Coordinates::new(lat, lon));
    if coordinates.is_none() {
        warn!(lat = ?first.lat, lon = ?first.lon, "geocoder match has unusable coordinates");
    }
    Ok(coordinates)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapPin {
    pub trip_id: TripId,
    pub title: String,
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// One pin per trip whose location has been resolved, in store order.
#[must_use]
pub fn pins(trips: &[Trip], map: &MapPins) -> Vec<MapPin> {
    trips
        .iter()
        .filter_map(|trip| {
            let at = map.coordinates(&trip.location)?;
            Some(MapPin {
                trip_id: trip.id,
                title: trip.title.clone(),
                location: trip.location.clone(),
                latitude: at.latitude,
                longitude: at.longitude,
            })
        })
        .collect()
}

/// Centered on the first pin.
#[must_use]
pub fn center(pins: &[MapPin]) -> Coordinates {
    pins.first().map_or(DEFAULT_CENTER, |pin| Coordinates {
        latitude: pin.latitude,
        longitude: pin.longitude,
    })
}

/// The pins as a GeoJSON layer for map widgets that take one. Positions are
/// longitude first.
#[must_use]
pub fn feature_collection(pins: &[MapPin]) -> FeatureCollection {
    pins.iter()
        .map(|pin| {
            let mut properties = JsonObject::new();
            properties.insert("title".into(), JsonValue::from(pin.title.clone()));
            properties.insert("location".into(), JsonValue::from(pin.location.clone()));
            Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::Point(vec![pin.longitude, pin.latitude]))),
                id: Some(feature::Id::Number(pin.trip_id.0.into())),
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn rome() -> Coordinates {
        Coordinates::new(41.89, 12.49).unwrap()
    }

    #[test]
    fn test_coordinates_are_validated() {
        assert!(Coordinates::new(90.0, 180.0).is_some());
        assert!(Coordinates::new(90.5, 0.0).is_none());
        assert!(Coordinates::new(0.0, -181.0).is_none());
        assert!(Coordinates::new(f64::NAN, 0.0).is_none());
    }

    #[test]
    fn test_plan_skips_blank_known_and_repeated_locations() {
        let mut map = MapPins::default();
        let first = map.plan(["Roma", " ", "Roma ", "Oslo"]);
        let asked: Vec<&str> = first.iter().map(|l| l.location.as_str()).collect();
        assert_eq!(asked, vec!["Roma", "Oslo"]);
        assert!(map.is_locating());

        assert!(map.apply("Roma", first[0].ticket, Ok(Some(rome()))));
        let second = map.plan(["Roma", "Oslo"]);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].location, "Oslo");
    }

    #[test]
    fn test_reissued_lookup_overtakes_older_answer() {
        let mut map = MapPins::default();
        let older = map.plan(["Roma"]).remove(0);
        let newer = map.plan(["Roma"]).remove(0);

        assert!(!map.apply("Roma", older.ticket, Ok(None)));
        assert!(map.coordinates("Roma").is_none());
        assert!(map.apply("Roma", newer.ticket, Ok(Some(rome()))));
        assert_eq!(map.coordinates("Roma"), Some(rome()));
        assert!(!map.is_locating());
    }

    #[test]
    fn test_failed_lookup_is_retried_next_time() {
        let mut map = MapPins::default();
        let lookup = map.plan(["Roma"]).remove(0);
        let offline = AppError::new(ErrorKind::Network, "offline");
        assert!(!map.apply("Roma", lookup.ticket, Err(offline)));
        assert_eq!(map.resolved_count(), 0);
        assert_eq!(map.plan(["Roma"]).len(), 1);
    }

    #[test]
    fn test_no_match_is_cached() {
        let mut map = MapPins::default();
        let lookup = map.plan(["Atlantide"]).remove(0);
        assert!(map.apply("Atlantide", lookup.ticket, Ok(None)));
        assert!(map.plan(["Atlantide"]).is_empty());
        assert!(map.coordinates("Atlantide").is_none());
    }

    #[test]
    fn test_parse_lookup_response() {
        let body = br#"[{"place_id": 9, "lat": "41.8933203", "lon": "12.4829321"}]"#;
        let at = parse_lookup_response(body).unwrap().unwrap();
        assert!((at.latitude - 41.893_320_3).abs() < 1e-9);
        assert!((at.longitude - 12.482_932_1).abs() < 1e-9);

        assert_eq!(parse_lookup_response(b"[]").unwrap(), None);
        assert_eq!(parse_lookup_response(br#"[{"lat": "north", "lon": "1"}]"#).unwrap(), None);
        assert!(parse_lookup_response(b"{}").is_err());
    }

    #[test]
    fn test_pins_follow_store_order_and_center_on_the_first() {
        let mut map = MapPins::default();
        let trips = vec![
            Trip::new(TripId(1), "Unknown").with_location("Nowhere"),
            Trip::new(TripId(2), "Rome Weekend").with_location("Roma"),
        ];
        assert_eq!(center(&pins(&trips, &map)), DEFAULT_CENTER);

        let lookups = map.plan(trips.iter().map(|t| t.location.as_str()));
        map.apply("Nowhere", lookups[0].ticket, Ok(None));
        map.apply("Roma", lookups[1].ticket, Ok(Some(rome())));

        let pins = pins(&trips, &map);
        assert_eq!(pins.len(), 1);
        assert_eq!(pins[0].trip_id, TripId(2));
        assert_eq!(center(&pins), rome());
    }

    #[test]
    fn test_feature_collection_puts_longitude_first() {
        let pin = MapPin {
            trip_id: TripId(2),
            title: "Rome Weekend".into(),
            location: "Roma".into(),
            latitude: 41.89,
            longitude: 12.49,
        };
        let layer = feature_collection(&[pin]);
        let json: serde_json::Value = serde_json::from_str(&layer.to_string()).unwrap();

        assert_eq!(json["type"], "FeatureCollection");
        let feature = &json["features"][0];
        assert_eq!(feature["id"], 2);
        assert_eq!(feature["geometry"]["coordinates"], serde_json::json!([12.49, 41.89]));
        assert_eq!(feature["properties"]["title"], "Rome Weekend");
    }
}
