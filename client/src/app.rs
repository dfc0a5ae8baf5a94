#![cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]

use std::cell::RefCell;

use gloo_storage::Storage;
use leptos::prelude::*;
use squares_shared::{Coordinate, DEFAULT_MAX_CONCURRENT, SchedulerConfig};
use wasm_bindgen::JsCast;
use wasm_bindgen::closure::Closure;

use crate::map::{ImageMap, SharedMap};

const DEFAULT_TEMPLATE: &str = "https://tile.openstreetmap.org/{Z}/{X}/{Y}.png";
const DEFAULT_CENTER: Coordinate = Coordinate::new(2.0, 2.0, 2.0);
const VIEW_STORAGE_KEY: &str = "squares_view";
const PAN_STEP_PX: f64 = 128.0;
const ZOOM_STEP: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MapSettings {
    pub template: String,
    pub center: Coordinate,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum MapAction {
    Pan(f64, f64),
    Zoom(f64),
    Home,
}

struct ResizeBinding {
    window: web_sys::Window,
    _handler: Closure<dyn Fn()>,
}

struct KeydownBinding {
    window: web_sys::Window,
    _handler: Closure<dyn Fn(web_sys::KeyboardEvent)>,
}

thread_local! {
    static MAP_HANDLE: RefCell<Option<SharedMap>> = const { RefCell::new(None) };
    static RESIZE_BINDING: RefCell<Option<ResizeBinding>> = const { RefCell::new(None) };
    static KEYDOWN_BINDING: RefCell<Option<KeydownBinding>> = const { RefCell::new(None) };
}

/// Query parameters win over the last saved view, which wins over defaults.
/// `?template=…&row=…&column=…&zoom=…&concurrency=…`
pub(crate) fn resolve_settings(
    query: impl Fn(&str) -> Option<String>,
    saved_center: Option<Coordinate>,
) -> MapSettings {
    let number = |name: &str| {
        query(name)
            .and_then(|value| value.trim().parse::<f64>().ok())
            .filter(|value| value.is_finite())
    };

    let template = query("template")
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string());

    let center = match (number("row"), number("column"), number("zoom")) {
        (Some(row), Some(column), Some(zoom)) => Coordinate::new(row, column, zoom),
        _ => saved_center.unwrap_or(DEFAULT_CENTER),
    };

    let max_concurrent = query("concurrency")
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_MAX_CONCURRENT);

    MapSettings {
        template,
        center,
        scheduler: SchedulerConfig::with_max_concurrent(max_concurrent),
    }
}

fn load_settings() -> MapSettings {
    let search = web_sys::window()
        .and_then(|window| window.location().search().ok())
        .unwrap_or_default();
    let params = web_sys::UrlSearchParams::new_with_str(&search).ok();
    let saved: Option<Coordinate> = gloo_storage::LocalStorage::get(VIEW_STORAGE_KEY).ok();
    resolve_settings(
        |name| params.as_ref().and_then(|params| params.get(name)),
        saved,
    )
}

fn action_for_key(key: &str) -> Option<MapAction> {
    match key {
        "ArrowLeft" => Some(MapAction::Pan(PAN_STEP_PX, 0.0)),
        "ArrowRight" => Some(MapAction::Pan(-PAN_STEP_PX, 0.0)),
        "ArrowUp" => Some(MapAction::Pan(0.0, PAN_STEP_PX)),
        "ArrowDown" => Some(MapAction::Pan(0.0, -PAN_STEP_PX)),
        "+" | "=" => Some(MapAction::Zoom(ZOOM_STEP)),
        "-" => Some(MapAction::Zoom(-ZOOM_STEP)),
        "Home" => Some(MapAction::Home),
        _ => None,
    }
}

fn bind_window_events(window: &web_sys::Window, map: &SharedMap, home: Coordinate) {
    RESIZE_BINDING.with(|slot| {
        if let Some(old) = slot.borrow_mut().take() {
            let _ = old
                .window
                .remove_event_listener_with_callback("resize", old._handler.as_ref().unchecked_ref());
        }
    });
    KEYDOWN_BINDING.with(|slot| {
        if let Some(old) = slot.borrow_mut().take() {
            let _ = old
                .window
                .remove_event_listener_with_callback("keydown", old._handler.as_ref().unchecked_ref());
        }
    });

    let map_for_resize = map.clone();
    let on_resize = Closure::<dyn Fn()>::new(move || {
        map_for_resize.borrow_mut().update_size();
    });
    if window
        .add_event_listener_with_callback("resize", on_resize.as_ref().unchecked_ref())
        .is_ok()
    {
        RESIZE_BINDING.with(|slot| {
            *slot.borrow_mut() = Some(ResizeBinding {
                window: window.clone(),
                _handler: on_resize,
            });
        });
    }

    let map_for_keys = map.clone();
    let on_keydown =
        Closure::<dyn Fn(web_sys::KeyboardEvent)>::new(move |e: web_sys::KeyboardEvent| {
            let Some(action) = action_for_key(&e.key()) else {
                return;
            };
            e.prevent_default();
            let mut map = map_for_keys.borrow_mut();
            match action {
                MapAction::Pan(dx, dy) => map.pan(dx, dy),
                MapAction::Zoom(delta) => map.zoom_by(delta),
                MapAction::Home => map.set_center_zoom(home),
            }
        });
    if window
        .add_event_listener_with_callback("keydown", on_keydown.as_ref().unchecked_ref())
        .is_ok()
    {
        KEYDOWN_BINDING.with(|slot| {
            *slot.borrow_mut() = Some(KeydownBinding {
                window: window.clone(),
                _handler: on_keydown,
            });
        });
    }
}

#[component]
pub fn App() -> impl IntoView {
    let container = NodeRef::<leptos::html::Div>::new();

    Effect::new(move || {
        let Some(element) = container.get() else {
            return;
        };
        let Some(window) = web_sys::window() else {
            return;
        };

        let settings = load_settings();
        let map = ImageMap::new(
            element.into(),
            settings.template,
            settings.center,
            settings.scheduler,
        );
        map.borrow_mut().on_moved(|center| {
            let _ = gloo_storage::LocalStorage::set(VIEW_STORAGE_KEY, center);
        });

        bind_window_events(&window, &map, settings.center);
        MAP_HANDLE.with(|slot| {
            // Dropping a previous map detaches its tile callbacks.
            *slot.borrow_mut() = Some(map);
        });
    });

    view! {
        <div
            node_ref=container
            style="position: absolute; inset: 0; overflow: hidden; background: #dcdcdc;"
        />
    }
}
