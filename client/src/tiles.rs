#![cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]

use js_sys::Reflect;
use squares_shared::LoadTarget;
use wasm_bindgen::JsCast;
use wasm_bindgen::JsValue;
use wasm_bindgen::prelude::*;
use web_sys::HtmlImageElement;

const ONLOAD_HANDLE_KEY: &str = "__squaresTileOnload";
const ONERROR_HANDLE_KEY: &str = "__squaresTileOnerror";

/// An `<img>` waiting for its `src`. Attached while it is still in the
/// document.
pub struct ImageTarget {
    image: HtmlImageElement,
}

impl ImageTarget {
    pub fn new(image: HtmlImageElement) -> Self {
        Self { image }
    }
}

impl LoadTarget for ImageTarget {
    fn is_attached(&self) -> bool {
        self.image.is_connected()
    }

    fn begin(&mut self, url: &str) {
        self.image.set_src(url);
    }
}

/// Install load/error callbacks. The closures are kept alive on the element
/// itself and released again by [`clear_image_handlers`].
pub fn set_image_handlers(
    img: &HtmlImageElement,
    on_load: impl FnMut() + 'static,
    on_error: impl FnMut() + 'static,
) {
    let onload = Closure::<dyn FnMut()>::new(on_load);
    let onerror = Closure::<dyn FnMut()>::new(on_error);

    let onload_js = onload.into_js_value();
    let onerror_js = onerror.into_js_value();
    img.set_onload(Some(onload_js.unchecked_ref()));
    img.set_onerror(Some(onerror_js.unchecked_ref()));
    let _ = Reflect::set(
        img.as_ref(),
        &JsValue::from_str(ONLOAD_HANDLE_KEY),
        &onload_js,
    );
    let _ = Reflect::set(
        img.as_ref(),
        &JsValue::from_str(ONERROR_HANDLE_KEY),
        &onerror_js,
    );
}

pub fn clear_image_handlers(img: &HtmlImageElement) {
    img.set_onload(None);
    img.set_onerror(None);
    let _ = Reflect::delete_property(img.as_ref(), &JsValue::from_str(ONLOAD_HANDLE_KEY));
    let _ = Reflect::delete_property(img.as_ref(), &JsValue::from_str(ONERROR_HANDLE_KEY));
}
