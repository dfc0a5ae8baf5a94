#![cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use squares_shared::{
    Coordinate, DEFAULT_PYRAMID, Grid, LoadScheduler, Outcome, SchedulerConfig, TileKey,
    VisibleSet, expand,
};
use web_sys::{HtmlElement, HtmlImageElement};

use crate::tiles::{ImageTarget, clear_image_handlers, set_image_handlers};
use crate::viewport::{container_size, place_tile};

pub type SharedMap = Rc<RefCell<ImageMap>>;

struct TileElement {
    id: u64,
    image: HtmlImageElement,
}

/// A map made of `<img class="tile">` elements inside a container. Tiles
/// that scroll in are queued for loading; tiles that scroll out are
/// cancelled and removed.
pub struct ImageMap {
    container: HtmlElement,
    grid: Grid,
    template: String,
    visible: VisibleSet,
    elements: HashMap<TileKey, TileElement>,
    scheduler: LoadScheduler<u64, ImageTarget>,
    next_id: u64,
    on_moved: Option<Box<dyn Fn(Coordinate)>>,
    this: Weak<RefCell<ImageMap>>,
}

impl ImageMap {
    pub fn new(
        container: HtmlElement,
        template: String,
        center: Coordinate,
        config: SchedulerConfig,
    ) -> SharedMap {
        let (width, height) = container_size(&container);
        let map = Rc::new_cyclic(|this| {
            RefCell::new(Self {
                container,
                grid: Grid::new(width, height, center, DEFAULT_PYRAMID),
                template,
                visible: VisibleSet::new(),
                elements: HashMap::new(),
                scheduler: LoadScheduler::new(config),
                next_id: 0,
                on_moved: None,
                this: this.clone(),
            })
        });
        map.borrow_mut().redraw(true);
        map
    }

    /// Called after every redraw that moved the map. Must not borrow the map.
    pub fn on_moved(&mut self, callback: impl Fn(Coordinate) + 'static) {
        self.on_moved = Some(Box::new(callback));
    }

    pub fn set_center_zoom(&mut self, center: Coordinate) {
        self.grid.set_center(center);
        self.redraw(true);
    }

    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.grid.pan(dx, dy);
        self.redraw(true);
    }

    pub fn zoom_by(&mut self, delta: f64) {
        self.grid.zoom_by(delta);
        self.redraw(true);
    }

    /// Pick up the container's current size.
    pub fn update_size(&mut self) {
        let (width, height) = container_size(&self.container);
        self.grid.resize(width, height);
        self.redraw(true);
    }

    /// Join the visible tiles against the elements on the page, position
    /// everything and admit queued loads.
    pub fn redraw(&mut self, moved: bool) {
        let tiles = self.grid.visible_tiles();
        let diff = self.visible.replace(&tiles);

        for key in &diff.exited {
            if let Some(tile) = self.elements.remove(key) {
                self.scheduler.cancel(&tile.id);
                clear_image_handlers(&tile.image);
                tile.image.remove();
            }
        }
        for &key in &diff.entered {
            self.add_tile(key);
        }

        for (key, tile) in &self.elements {
            place_tile(&tile.image, self.grid.tile_rect(*key));
        }

        if moved && let Some(callback) = self.on_moved.as_ref() {
            callback(self.grid.center);
        }

        self.scheduler.process();
    }

    fn add_tile(&mut self, key: TileKey) {
        let image = match HtmlImageElement::new() {
            Ok(image) => image,
            Err(_) => {
                web_sys::console::warn_1(&format!("could not create image for tile {key}").into());
                return;
            }
        };
        image.set_class_name("tile");
        image.set_id(&key.to_key());
        let style = image.style();
        let _ = style.set_property("position", "absolute");
        let _ = style.set_property("left", "0");
        let _ = style.set_property("top", "0");
        let _ = style.set_property("transform-origin", "0 0");
        let _ = style.set_property("z-index", &key.zoom.to_string());
        let _ = style.set_property("display", "none");
        if self.container.append_child(&image).is_err() {
            return;
        }

        let id = self.next_id;
        self.next_id += 1;

        let this = self.this.clone();
        let image_for_load = image.clone();
        let this_for_error = self.this.clone();
        let image_for_error = image.clone();
        set_image_handlers(
            &image,
            move || {
                if let Some(map) = this.upgrade() {
                    map.borrow_mut()
                        .tile_settled(key, id, &image_for_load, Outcome::Loaded);
                }
            },
            move || {
                if let Some(map) = this_for_error.upgrade() {
                    map.borrow_mut()
                        .tile_settled(key, id, &image_for_error, Outcome::Failed);
                }
            },
        );

        let url = expand(&self.template, key);
        let target = ImageTarget::new(image.clone());
        if let Err(e) = self.scheduler.enqueue(id, key.priority(), url, target) {
            web_sys::console::warn_1(&e.to_string().into());
        }
        self.elements.insert(key, TileElement { id, image });
    }

    fn tile_settled(&mut self, key: TileKey, id: u64, image: &HtmlImageElement, outcome: Outcome) {
        clear_image_handlers(image);
        let settled = self.scheduler.complete(&id, outcome);
        let still_shown = self.elements.get(&key).is_some_and(|tile| tile.id == id);

        if still_shown && outcome == Outcome::Loaded {
            let _ = image.style().set_property("display", "block");
        }
        if settled.is_some() {
            self.redraw(false);
        }
    }
}
