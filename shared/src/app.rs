use std::collections::BTreeMap;

use crux_http::RequestBuilder;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::capabilities::{Capabilities, HttpResult};
use crate::categories::{parse_category_list, CategoryRecord};
use crate::config::{AppConfig, Endpoints};
use crate::editor::TripDraft;
use crate::error::{AppError, ErrorKind, MutationError};
use crate::event::Event;
use crate::geometry::{CarouselKey, GeometryTracker, ProbeRequest};
use crate::map::parse_lookup_response;
use crate::model::{Model, ToastKind};
use crate::mutation::{MutationToken, ReadId, Resolution};
use crate::sequence::Ticket;
use crate::suggestions::{parse_geocoder_response, SuggestionAction};
use crate::trip::{parse_trip, parse_trip_list, ImagePayload, TripField, TripId};
use crate::view::ViewModel;

#[derive(Default)]
pub struct App;

impl App {
    fn endpoints(model: &mut Model) -> Option<Endpoints> {
        let endpoints = model.endpoints.clone();
        if endpoints.is_none() {
            error!("no valid configuration; request dropped");
            model.set_error(AppError::new(
                ErrorKind::InvalidState,
                "No valid configuration has been applied",
            ));
        }
        endpoints
    }

    /// Attaches `body` as JSON and sends. A body that cannot be encoded is
    /// answered locally with the error, so the usual failure path runs.
    fn send_json<B, F>(
        builder: RequestBuilder<Event>,
        body: &B,
        make_event: F,
        model: &mut Model,
        caps: &Capabilities,
    ) where
        B: Serialize,
        F: FnOnce(HttpResult) -> Event + Send + 'static,
    {
        match builder.body_json(body) {
            Ok(builder) => builder.send(make_event),
            Err(e) => {
                error!(error = %e, "request body could not be encoded");
                Self::handle(make_event(Err(e)), model, caps);
            }
        }
    }

    /// The body of a 2xx answer. Services that answer with another status
    /// become an [`AppError`] built from the status and the error body.
    fn into_body(result: HttpResult) -> Result<Vec<u8>, AppError> {
        match result {
            Ok(mut response) => {
                let status = response.status();
                let body = response.take_body().unwrap_or_default();
                if status.is_success() {
                    Ok(body)
                } else {
                    Err(AppError::from_http_status(u16::from(status), Some(&body)))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    fn undecodable(what: &str, e: &serde_json::Error) -> AppError {
        AppError::new(ErrorKind::Deserialization, format!("Could not read {what}"))
            .with_internal(e.to_string())
    }

    fn not_loaded(id: TripId) -> AppError {
        AppError::new(ErrorKind::NotFound, format!("Trip {id} is not loaded"))
            .with_context("trip_id", id.to_string())
    }

    fn send_probe(request: ProbeRequest, caps: &Capabilities) {
        let ProbeRequest {
            key,
            generation,
            indices,
            payloads,
        } = request;
        caps.images.measure(payloads, move |aspects| Event::ImageAspectsResolved {
            key,
            generation,
            indices,
            aspects,
        });
    }

    fn track_trip_images(model: &mut Model, caps: &Capabilities, id: TripId) {
        let Some(trip) = model.trips.get(id) else {
            return;
        };
        if let Some(request) = model.geometry.track(CarouselKey::Trip(id), &trip.images) {
            Self::send_probe(request, caps);
        }
    }

    fn track_draft_images(model: &mut Model, caps: &Capabilities) {
        if let Some(request) = model.geometry.track(CarouselKey::Draft, &model.draft.images) {
            Self::send_probe(request, caps);
        }
    }

    fn apply_config(config: AppConfig, model: &mut Model, caps: &Capabilities) {
        let endpoints = match config.validate() {
            Ok(endpoints) => endpoints,
            Err(e) => {
                error!(error = %e, "configuration rejected; keeping the previous one");
                model.set_error(e.into());
                return;
            }
        };

        let rebuild = config.aspect_cache_capacity != model.config.aspect_cache_capacity;
        info!(
            api = %config.api_base_url,
            timeout_ms = config.request_timeout_ms,
            "configuration applied"
        );
        model.endpoints = Some(endpoints);
        model.config = config;

        if rebuild {
            model.geometry = GeometryTracker::new(model.config.aspect_cache_capacity());
            if let Some(id) = model.selected_trip {
                Self::track_trip_images(model, caps, id);
            }
            Self::track_draft_images(model, caps);
        }
    }

    fn send_refresh(model: &mut Model, caps: &Capabilities) {
        let Some(endpoints) = Self::endpoints(model) else {
            return;
        };
        let ticket = model.trips.begin_refresh();
        let read = model.mutations.begin_read();
        debug!(%ticket, %read, "refreshing trips");
        caps.http
            .get(endpoints.trips())
            .send(move |result| Event::RefreshResponse {
                ticket,
                read,
                result: Box::new(result),
            });
    }

    fn handle_refresh_response(
        ticket: Ticket,
        read: ReadId,
        result: HttpResult,
        model: &mut Model,
        caps: &Capabilities,
    ) {
        let parsed = Self::into_body(result).and_then(|body| {
            parse_trip_list(&body).map_err(|e| Self::undecodable("the trip list", &e))
        });

        match parsed {
            Ok(list) => {
                let count = list.len();
                if model.trips.complete_refresh(ticket, list) {
                    model.mutations.reconcile(&mut model.trips, read);
                    model.rederive_search();
                    info!(%ticket, count, "trips refreshed");
                    if let Some(id) = model.selected_trip {
                        Self::track_trip_images(model, caps, id);
                    }
                }
            }
            Err(e) => {
                if model.trips.fail_refresh(ticket) {
                    warn!(%ticket, error = %e, "refresh failed; keeping cached trips");
                    model.show_toast(e.user_facing_message(), ToastKind::Warning);
                }
            }
        }
        model.mutations.finish_read(read);
    }

    fn open_trip(id: TripId, model: &mut Model, caps: &Capabilities) {
        if model.selected_trip != Some(id) {
            if let Some(previous) = model.selected_trip {
                model.geometry.forget(CarouselKey::Trip(previous));
            }
            model.selected_trip = Some(id);
        }
        Self::track_trip_images(model, caps, id);

        if !model.trips.needs_fetch(id) {
            debug!(trip_id = %id, "serving trip from cache");
            return;
        }
        let Some(endpoints) = Self::endpoints(model) else {
            return;
        };
        let ticket = model.trips.begin_fetch(id);
        let read = model.mutations.begin_read();
        debug!(trip_id = %id, %ticket, %read, "fetching trip");
        caps.http.get(endpoints.trip(id)).send(move |result| Event::TripResponse {
            id,
            ticket,
            read,
            result: Box::new(result),
        });
    }

    fn handle_trip_response(
        id: TripId,
        ticket: Ticket,
        read: ReadId,
        result: HttpResult,
        model: &mut Model,
        caps: &Capabilities,
    ) {
        let parsed = Self::into_body(result)
            .and_then(|body| parse_trip(&body).map_err(|e| Self::undecodable("the trip", &e)));

        match parsed {
            Ok(trip) => {
                if model.trips.complete_fetch(id, ticket, trip) {
                    model.mutations.reconcile(&mut model.trips, read);
                    model.rederive_search();
                    debug!(trip_id = %id, %ticket, "trip loaded");
                    if model.selected_trip == Some(id) {
                        Self::track_trip_images(model, caps, id);
                    }
                }
            }
            Err(e) => {
                if model.trips.fail_fetch(id, ticket) {
                    warn!(trip_id = %id, %ticket, error = %e, "trip fetch failed");
                    model.set_error(e.with_context("trip_id", id.to_string()));
                }
            }
        }
        model.mutations.finish_read(read);
    }

    fn send_delete(id: TripId, model: &mut Model, caps: &Capabilities) {
        if !model.trips.contains(id) {
            model.set_error(Self::not_loaded(id));
            return;
        }
        if model.pending_deletes.contains(&id) {
            debug!(trip_id = %id, "delete already in flight");
            return;
        }
        let Some(endpoints) = Self::endpoints(model) else {
            return;
        };
        model.pending_deletes.insert(id);
        caps.http
            .delete(endpoints.trip(id))
            .send(move |result| Event::DeleteTripResponse {
                id,
                result: Box::new(result),
            });
    }

    fn handle_delete_response(id: TripId, result: HttpResult, model: &mut Model) {
        model.pending_deletes.remove(&id);
        match Self::into_body(result) {
            Ok(_) => {
                model.trips.remove(id);
                model.mutations.forget_trip(id);
                model.geometry.forget(CarouselKey::Trip(id));
                if model.selected_trip == Some(id) {
                    model.selected_trip = None;
                }
                model.rederive_search();
                info!(trip_id = %id, "trip deleted");
                model.show_toast("Trip deleted", ToastKind::Success);
            }
            Err(cause) => {
                warn!(trip_id = %id, error = %cause, "delete failed; trip kept");
                model.report_mutation_error(MutationError::Delete { trip_id: id, cause });
            }
        }
    }

    fn send_toggle(id: TripId, field: TripField, model: &mut Model, caps: &Capabilities) {
        let Some(endpoints) = Self::endpoints(model) else {
            return;
        };
        let Some(mutation) = model.mutations.begin(&mut model.trips, id, field) else {
            model.set_error(Self::not_loaded(id));
            return;
        };

        let token = mutation.token;
        debug!(trip_id = %id, %field, %token, value = mutation.requested, "toggle applied locally");
        let body = BTreeMap::from([(field.wire_key(), mutation.requested)]);
        let builder = caps.http.patch(endpoints.trip_field(id, field));
        Self::send_json(
            builder,
            &body,
            move |result| Event::ToggleResponse {
                id,
                field,
                token,
                result: Box::new(result),
            },
            model,
            caps,
        );
    }

    fn handle_toggle_response(
        id: TripId,
        field: TripField,
        token: MutationToken,
        result: HttpResult,
        model: &mut Model,
    ) {
        let outcome = Self::into_body(result).map(|_| ());
        match model
            .mutations
            .resolve(&mut model.trips, id, field, token, outcome)
        {
            Resolution::RolledBack { error, .. } => model.report_mutation_error(error),
            Resolution::Confirmed(_) | Resolution::Superseded { .. } | Resolution::Unknown => {}
        }
    }

    fn submit_create(draft: &TripDraft, model: &mut Model, caps: &Capabilities) {
        let request = match draft.to_create_request() {
            Ok(request) => request,
            Err(e) => {
                model.is_saving = false;
                model.set_error(e.into());
                return;
            }
        };
        let Some(endpoints) = Self::endpoints(model) else {
            model.is_saving = false;
            return;
        };
        model.is_saving = true;
        let builder = caps.http.post(endpoints.trips());
        Self::send_json(
            builder,
            &request,
            |result| Event::CreateTripResponse {
                result: Box::new(result),
            },
            model,
            caps,
        );
    }

    fn start_create(draft: TripDraft, model: &mut Model, caps: &Capabilities) {
        if model.is_saving {
            debug!("submission already in progress");
            return;
        }
        if let Err(e) = draft.validate() {
            model.set_error(e.into());
            return;
        }
        let Some(endpoints) = Self::endpoints(model) else {
            return;
        };

        let category = draft.category.trim().to_string();
        if model.categories.needs_registration(&category) {
            if let Ok(Some(name)) = model.categories.begin_add(&category) {
                debug!(category = %name, "registering category before saving trip");
                model.is_saving = true;
                Self::send_add_category(&endpoints, name, Some(draft), model, caps);
                return;
            }
        }
        Self::submit_create(&draft, model, caps);
    }

    fn handle_create_response(result: HttpResult, model: &mut Model, caps: &Capabilities) {
        model.is_saving = false;
        let body = match Self::into_body(result) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "trip creation failed");
                model.set_error(e);
                return;
            }
        };

        model.draft = TripDraft::default();
        model.geometry.forget(CarouselKey::Draft);
        model.suggestions.clear();
        model.show_toast("Trip saved", ToastKind::Success);

        match parse_trip(&body) {
            Ok(trip) => {
                info!(trip_id = %trip.id, "trip created");
                model.trips.insert_front(trip);
                model.rederive_search();
            }
            Err(e) => {
                warn!(error = %e, "created trip unreadable; refreshing");
                Self::send_refresh(model, caps);
            }
        }
    }

    fn send_update(id: TripId, draft: TripDraft, model: &mut Model, caps: &Capabilities) {
        if model.is_saving {
            debug!("submission already in progress");
            return;
        }
        if !model.trips.contains(id) {
            model.set_error(Self::not_loaded(id));
            return;
        }
        let request = match draft.to_update_request() {
            Ok(request) => request,
            Err(e) => {
                model.set_error(e.into());
                return;
            }
        };
        let Some(endpoints) = Self::endpoints(model) else {
            return;
        };
        model.is_saving = true;
        let builder = caps.http.patch(endpoints.trip(id));
        Self::send_json(
            builder,
            &request,
            move |result| Event::UpdateTripResponse {
                id,
                draft,
                result: Box::new(result),
            },
            model,
            caps,
        );
    }

    fn handle_update_response(id: TripId, draft: &TripDraft, result: HttpResult, model: &mut Model) {
        model.is_saving = false;
        match Self::into_body(result) {
            Ok(_) => {
                if let Some(mut trip) = model.trips.get(id).cloned() {
                    draft.apply_to(&mut trip);
                    model.trips.upsert(trip);
                    model.rederive_search();
                }
                info!(trip_id = %id, "trip updated");
                model.show_toast("Trip updated", ToastKind::Success);
            }
            Err(e) => {
                warn!(trip_id = %id, error = %e, "trip update failed");
                model.set_error(e.with_context("trip_id", id.to_string()));
            }
        }
    }

    fn send_suggestions(text: String, model: &mut Model, caps: &Capabilities) {
        model.draft.location.clone_from(&text);
        let Some(endpoints) = Self::endpoints(model) else {
            return;
        };
        let (ticket, query) = match model
            .suggestions
            .on_input(&text, model.config.suggestion_min_chars)
        {
            SuggestionAction::Cleared => return,
            SuggestionAction::Fetch { ticket, query } => (ticket, query),
        };

        debug!(%ticket, %query, "looking up location");
        let url = endpoints.geocoder_search(&query, model.config.suggestion_limit);
        Self::geocoder_get(url.as_str(), model, caps).send(move |result| {
            Event::LocationSuggestionsResponse {
                ticket,
                result: Box::new(result),
            }
        });
    }

    fn handle_suggestions_response(ticket: Ticket, result: HttpResult, model: &mut Model) {
        let limit = model.config.suggestion_limit;
        let parsed = Self::into_body(result).and_then(|body| {
            parse_geocoder_response(&body, limit)
                .map_err(|e| Self::undecodable("location suggestions", &e))
        });
        model.suggestions.apply(ticket, parsed);
    }

    /// The public geocoder asks every client to identify itself.
    fn geocoder_get(url: &str, model: &Model, caps: &Capabilities) -> RequestBuilder<Event> {
        caps.http
            .get(url)
            .header("User-Agent", model.config.geocoder_user_agent.as_str())
            .header("Accept-Language", model.config.geocoder_language.as_str())
    }

    fn locate_trips(model: &mut Model, caps: &Capabilities) {
        let Some(endpoints) = Self::endpoints(model) else {
            return;
        };
        let lookups = model
            .map
            .plan(model.trips.trips().iter().map(|trip| trip.location.as_str()));
        if lookups.is_empty() {
            debug!("every trip location is already known");
            return;
        }
        debug!(count = lookups.len(), "locating trips for the map");
        for lookup in lookups {
            let url = endpoints.geocoder_lookup(&lookup.location);
            let (location, ticket) = (lookup.location, lookup.ticket);
            Self::geocoder_get(url.as_str(), model, caps).send(move |result| {
                Event::MapLocationResponse {
                    location,
                    ticket,
                    result: Box::new(result),
                }
            });
        }
    }

    fn handle_map_location(location: &str, ticket: Ticket, result: HttpResult, model: &mut Model) {
        let parsed = Self::into_body(result).and_then(|body| {
            parse_lookup_response(&body).map_err(|e| Self::undecodable("the map location", &e))
        });
        model.map.apply(location, ticket, parsed);
    }

    fn send_category_list(force: bool, model: &mut Model, caps: &Capabilities) {
        let Some(endpoints) = Self::endpoints(model) else {
            return;
        };
        let Some(ticket) = model.categories.begin_list(force) else {
            debug!("serving categories from cache");
            return;
        };
        caps.http
            .get(endpoints.categories())
            .send(move |result| Event::CategoriesResponse {
                ticket,
                result: Box::new(result),
            });
    }

    fn handle_category_list(ticket: Ticket, result: HttpResult, model: &mut Model) {
        let parsed = Self::into_body(result).and_then(|body| {
            parse_category_list(&body).map_err(|e| Self::undecodable("categories", &e))
        });
        match parsed {
            Ok(names) => {
                let count = names.len();
                if model.categories.apply_list(ticket, names) {
                    debug!(%ticket, count, "categories loaded");
                }
            }
            Err(e) => {
                if model.categories.fail_list(ticket) {
                    warn!(%ticket, error = %e, "category list failed; keeping cache");
                    model.show_toast(e.user_facing_message(), ToastKind::Warning);
                }
            }
        }
    }

    fn send_add_category(
        endpoints: &Endpoints,
        name: String,
        pending_trip: Option<TripDraft>,
        model: &mut Model,
        caps: &Capabilities,
    ) {
        let body = CategoryRecord { nome: name.clone() };
        let builder = caps.http.post(endpoints.categories());
        Self::send_json(
            builder,
            &body,
            move |result| Event::AddCategoryResponse {
                name,
                pending_trip,
                result: Box::new(result),
            },
            model,
            caps,
        );
    }

    fn add_category(raw: &str, model: &mut Model, caps: &Capabilities) {
        let Some(endpoints) = Self::endpoints(model) else {
            return;
        };
        match model.categories.begin_add(raw) {
            Ok(Some(name)) => Self::send_add_category(&endpoints, name, None, model, caps),
            Ok(None) => debug!(category = raw, "add already in flight"),
            Err(e) => model.set_error(e),
        }
    }

    fn handle_add_category(
        name: &str,
        pending_trip: Option<TripDraft>,
        result: HttpResult,
        model: &mut Model,
        caps: &Capabilities,
    ) {
        let outcome = Self::into_body(result).map(|_| ());
        let outcome = model.categories.complete_add(name, outcome);

        let Some(draft) = pending_trip else {
            match outcome {
                Ok(()) => model.show_toast(format!("Category '{name}' added"), ToastKind::Success),
                Err(e) => model.set_error(e),
            }
            return;
        };

        match outcome {
            Ok(()) => {}
            Err(e) if e.kind == ErrorKind::Conflict => {
                debug!(category = name, "category already registered");
            }
            Err(e) => warn!(category = name, error = %e, "category registration failed; saving trip anyway"),
        }
        Self::submit_create(&draft, model, caps);
    }

    fn send_remove_category(raw: &str, model: &mut Model, caps: &Capabilities) {
        let Some(endpoints) = Self::endpoints(model) else {
            return;
        };
        let name = match model.categories.begin_remove(raw, model.trips.trips()) {
            Ok(Some(name)) => name,
            Ok(None) => {
                debug!(category = raw, "remove already in flight");
                return;
            }
            Err(e) => {
                model.set_error(e);
                return;
            }
        };
        caps.http
            .delete(endpoints.category(&name))
            .send(move |result| Event::RemoveCategoryResponse {
                name,
                result: Box::new(result),
            });
    }

    fn handle_remove_category(name: &str, result: HttpResult, model: &mut Model) {
        let outcome = Self::into_body(result).map(|_| ());
        match model.categories.complete_remove(name, outcome) {
            Ok(()) => model.show_toast(format!("Category '{name}' removed"), ToastKind::Success),
            Err(e) => model.set_error(e),
        }
    }

    fn change_draft_images(images: Vec<ImagePayload>, model: &mut Model, caps: &Capabilities) {
        model.draft.images = images;
        Self::track_draft_images(model, caps);
    }

    fn handle(event: Event, model: &mut Model, caps: &Capabilities) {
        match event {
            Event::Noop => return,

            Event::Configure(config) => Self::apply_config(config, model, caps),

            Event::RefreshRequested => Self::send_refresh(model, caps),
            Event::RefreshResponse {
                ticket,
                read,
                result,
            } => Self::handle_refresh_response(ticket, read, *result, model, caps),

            Event::TripRequested { id } => Self::open_trip(id, model, caps),
            Event::TripResponse {
                id,
                ticket,
                read,
                result,
            } => Self::handle_trip_response(id, ticket, read, *result, model, caps),
            Event::TripClosed => {
                if let Some(id) = model.selected_trip.take() {
                    model.geometry.forget(CarouselKey::Trip(id));
                }
            }

            Event::DeleteTripRequested { id } => Self::send_delete(id, model, caps),
            Event::DeleteTripResponse { id, result } => {
                Self::handle_delete_response(id, *result, model);
            }

            Event::ToggleRequested { id, field } => Self::send_toggle(id, field, model, caps),
            Event::ToggleResponse {
                id,
                field,
                token,
                result,
            } => Self::handle_toggle_response(id, field, token, *result, model),

            Event::CreateTripRequested(draft) => Self::start_create(draft, model, caps),
            Event::CreateTripResponse { result } => {
                Self::handle_create_response(*result, model, caps);
            }
            Event::UpdateTripRequested { id, draft } => Self::send_update(id, draft, model, caps),
            Event::UpdateTripResponse { id, draft, result } => {
                Self::handle_update_response(id, &draft, *result, model);
            }
            Event::DraftImagesChanged { images } => Self::change_draft_images(images, model, caps),
            Event::DraftDiscarded => {
                model.draft = TripDraft::default();
                model.geometry.forget(CarouselKey::Draft);
                model.suggestions.clear();
            }

            Event::SearchQueryChanged { query } => {
                model.search.set_query(query, model.trips.trips());
            }

            Event::LocationQueryChanged { text } => Self::send_suggestions(text, model, caps),
            Event::LocationSuggestionsResponse { ticket, result } => {
                Self::handle_suggestions_response(ticket, *result, model);
            }
            Event::LocationSuggestionPicked { name } => {
                model.draft.location = name;
                model.suggestions.clear();
            }
            Event::SuggestionsDismissed => model.suggestions.clear(),

            Event::MapOpened => Self::locate_trips(model, caps),
            Event::MapLocationResponse {
                location,
                ticket,
                result,
            } => Self::handle_map_location(&location, ticket, *result, model),

            Event::ImageAspectsResolved {
                key,
                generation,
                indices,
                aspects,
            } => {
                if !model.geometry.apply(key, generation, &indices, &aspects) {
                    return;
                }
            }

            Event::CategoriesRequested { force } => Self::send_category_list(force, model, caps),
            Event::CategoriesResponse { ticket, result } => {
                Self::handle_category_list(ticket, *result, model);
            }
            Event::AddCategoryRequested { name } => Self::add_category(&name, model, caps),
            Event::AddCategoryResponse {
                name,
                pending_trip,
                result,
            } => Self::handle_add_category(&name, pending_trip, *result, model, caps),
            Event::RemoveCategoryRequested { name } => {
                Self::send_remove_category(&name, model, caps);
            }
            Event::RemoveCategoryResponse { name, result } => {
                Self::handle_remove_category(&name, *result, model);
            }

            Event::DismissError => model.clear_error(),
            Event::DismissToast => model.clear_toast(),
        }

        caps.render.render();
    }
}

impl crux_core::App for App {
    type Event = Event;
    type Model = Model;
    type ViewModel = ViewModel;
    type Capabilities = Capabilities;

    fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
        model.update_timestamp();
        debug!(
            event = event.name(),
            user = event.is_user_initiated(),
            "handling event"
        );
        Self::handle(event, model, caps);
    }

    fn view(&self, model: &Model) -> ViewModel {
        ViewModel::derive(model)
    }
}

#[cfg(test)]
mod tests {
    use crux_core::testing::{AppTester, Update};
    use url::Url;

    use super::*;
    use crate::capabilities::Effect;
    use crate::trip::Trip;

    fn seeded() -> Model {
        let mut model = Model::default();
        model.trips = crate::store::TripStore::with_trips(vec![
            Trip::new(TripId(1), "Rome Weekend").with_location("Rome, Italy"),
            Trip::new(TripId(2), "Alps Hike").with_location("Innsbruck"),
        ]);
        model.rederive_search();
        model
    }

    fn http_paths(update: Update<Effect, Event>) -> Vec<String> {
        update
            .effects
            .into_iter()
            .filter_map(|effect| match effect {
                Effect::Http(request) => {
                    let url = Url::parse(&request.operation.url).ok()?;
                    Some(format!("{} {}", request.operation.method, url.path()))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_every_handled_event_renders() {
        let app = AppTester::<App, Effect>::default();
        let mut model = seeded();
        let update = app.update(Event::SearchQueryChanged { query: "alps".into() }, &mut model);
        assert!(update.effects.iter().any(|e| matches!(e, Effect::Render(_))));

        let update = app.update(Event::Noop, &mut model);
        assert!(update.effects.is_empty());
    }

    #[test]
    fn test_invalid_config_keeps_previous() {
        let app = AppTester::<App, Effect>::default();
        let mut model = Model::default();
        let before = model.endpoints.clone();

        app.update(
            Event::Configure(AppConfig::default().with_api_base_url("ftp://nowhere")),
            &mut model,
        );
        assert_eq!(model.endpoints, before);
        assert_eq!(model.active_error.as_ref().unwrap().kind, ErrorKind::InvalidState);
    }

    #[test]
    fn test_toggle_emits_patch_with_wire_key() {
        let app = AppTester::<App, Effect>::default();
        let mut model = seeded();

        let update = app.update(
            Event::ToggleRequested {
                id: TripId(2),
                field: TripField::Repeat,
            },
            &mut model,
        );
        assert!(model.trips.get(TripId(2)).unwrap().repeat);

        let request = update
            .effects
            .into_iter()
            .find_map(|e| match e {
                Effect::Http(request) => Some(request.operation),
                _ => None,
            })
            .unwrap();
        assert_eq!(request.method, "PATCH");
        assert_eq!(Url::parse(&request.url).unwrap().path(), "/api/trips/2/repeat");
        assert_eq!(
            serde_json::from_slice::<serde_json::Value>(&request.body).unwrap(),
            serde_json::json!({"ripeti": true})
        );
    }

    #[test]
    fn test_toggle_unknown_trip_sends_nothing() {
        let app = AppTester::<App, Effect>::default();
        let mut model = seeded();
        let update = app.update(
            Event::ToggleRequested {
                id: TripId(9),
                field: TripField::Favorite,
            },
            &mut model,
        );
        assert!(http_paths(update).is_empty());
        assert_eq!(model.active_error.unwrap().kind, ErrorKind::NotFound);
    }

    #[test]
    fn test_invalid_draft_is_rejected_before_request() {
        let app = AppTester::<App, Effect>::default();
        let mut model = seeded();
        let update = app.update(Event::CreateTripRequested(TripDraft::new("  ")), &mut model);
        assert!(http_paths(update).is_empty());
        assert_eq!(model.active_error.unwrap().kind, ErrorKind::Validation);
        assert!(!model.is_saving);
    }

    #[test]
    fn test_cached_categories_are_not_refetched() {
        let app = AppTester::<App, Effect>::default();
        let mut model = seeded();

        let update = app.update(Event::CategoriesRequested { force: false }, &mut model);
        assert_eq!(http_paths(update), vec!["GET /api/tipology"]);

        let ticket = model.categories.begin_list(true).unwrap();
        model.categories.apply_list(ticket, vec!["Beach".into()]);
        let update = app.update(Event::CategoriesRequested { force: false }, &mut model);
        assert!(http_paths(update).is_empty());
    }

    #[test]
    fn test_open_trip_fetches_once_per_session() {
        let app = AppTester::<App, Effect>::default();
        let mut model = seeded();

        let update = app.update(Event::TripRequested { id: TripId(1) }, &mut model);
        assert_eq!(http_paths(update), vec!["GET /api/trips/1"]);
        assert_eq!(model.selected_trip, Some(TripId(1)));
        assert_eq!(model.mutations.open_reads(), 1);
    }

    #[test]
    fn test_short_location_query_sends_nothing() {
        let app = AppTester::<App, Effect>::default();
        let mut model = seeded();
        let update = app.update(Event::LocationQueryChanged { text: "Ro".into() }, &mut model);
        assert!(http_paths(update).is_empty());
        assert_eq!(model.draft.location, "Ro");
    }

    #[test]
    fn test_map_asks_the_geocoder_once_per_location() {
        let app = AppTester::<App, Effect>::default();
        let mut model = seeded();
        model.trips.insert_front(Trip::new(TripId(3), "Colosseum").with_location("Rome, Italy"));
        model.trips.insert_front(Trip::new(TripId(4), "Somewhere").with_location("  "));

        let update = app.update(Event::MapOpened, &mut model);
        let requests: Vec<_> = update
            .effects
            .into_iter()
            .filter_map(|e| match e {
                Effect::Http(request) => Some(request.operation),
                _ => None,
            })
            .collect();
        assert_eq!(requests.len(), 2);
        for request in &requests {
            let url = Url::parse(&request.url).unwrap();
            assert!(url.query_pairs().any(|(k, v)| k == "limit" && v == "1"));
            assert!(request.headers.iter().any(|h| h.name == "User-Agent"));
        }
        assert!(model.map.is_locating());
    }
}
