//! Tiled TMX map loading.
//!
//! Only what the exports inspect is modelled: map geometry, tilesets,
//! tile layers and custom properties. Object groups, image layers and
//! group layers are parsed past and dropped.

use std::os::raw::{c_char, c_int};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine as _;

use crate::error::{Error, Result};
use crate::ffi::{
    self, contract, raw, FatBytes, FatError, FatString, FatStringArray, FatTiledLayer,
    FatTiledLayerTile, FatTiledMap, FatTiledProperties,
};
use crate::string::{new_string, TextArray};
use crate::types::Status;
use crate::xml::{parse_tree, Element};
use crate::{compress, conv};

const FLIPPED_HORIZONTALLY: u32 = 0x8000_0000;
const FLIPPED_VERTICALLY: u32 = 0x4000_0000;
const FLIPPED_DIAGONALLY: u32 = 0x2000_0000;
const ROTATED_HEXAGONAL_120: u32 = 0x1000_0000;
const FLIP_MASK: u32 =
    FLIPPED_HORIZONTALLY | FLIPPED_VERTICALLY | FLIPPED_DIAGONALLY | ROTATED_HEXAGONAL_120;

/// One `<property>`; multi-line string values come from the element text.
#[derive(Debug, Clone)]
pub struct Property {
    pub name: String,
    pub kind: String,
    pub value: String,
}

#[derive(Debug, Clone, Default)]
pub struct Properties(Vec<Property>);

impl Properties {
    fn parse(parent: &Element) -> Self {
        let Some(props) = parent.child("properties") else {
            return Self::default();
        };
        Self(
            props
                .children_named("property")
                .map(|p| Property {
                    name: p.attr("name").unwrap_or_default().to_string(),
                    kind: p.attr("type").unwrap_or_default().to_string(),
                    value: p.attr("value").map(str::to_string).unwrap_or_else(|| p.text.clone()),
                })
                .collect(),
        )
    }

    /// Every value stored under `name`, in document order.
    pub fn get(&self, name: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|p| p.name == name)
            .map(|p| p.value.as_str())
            .collect()
    }

    fn first(&self, name: &str) -> &str {
        self.0
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
            .unwrap_or_default()
    }

    pub fn get_string(&self, name: &str) -> &str {
        self.first(name)
    }

    /// 0 when missing or not an integer.
    pub fn get_int(&self, name: &str) -> i64 {
        conv::atoi(self.first(name).as_bytes()).unwrap_or(0)
    }

    pub fn get_float(&self, name: &str) -> f64 {
        conv::parse_float(self.first(name).as_bytes(), 64).unwrap_or(0.0)
    }

    pub fn get_bool(&self, name: &str) -> bool {
        conv::parse_bool(self.first(name).as_bytes()).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Tileset {
    pub first_gid: u32,
    pub name: String,
    pub tile_width: i32,
    pub tile_height: i32,
    pub spacing: i32,
    pub margin: i32,
    pub tile_count: i32,
    pub columns: i32,
    pub image_width: i32,
}

impl Tileset {
    /// Pixel rectangle `(x, y, w, h)` of `id` inside the tileset image.
    pub fn tile_rect(&self, id: u32) -> (i32, i32, i32, i32) {
        let mut columns = self.columns;
        if columns == 0 && self.tile_width + self.spacing > 0 {
            columns = self.image_width / (self.tile_width + self.spacing);
        }
        let columns = columns.max(1);
        let id = i32::try_from(id).unwrap_or(i32::MAX);
        let (col, row) = (id % columns, id / columns);
        let x = col * self.tile_width + col * self.spacing + self.margin;
        let y = row * self.tile_height + row * self.spacing + self.margin;
        (x, y, self.tile_width, self.tile_height)
    }
}

/// A decoded cell. The nil tile has no tileset.
#[derive(Debug, Clone, Default)]
pub struct LayerTile {
    pub id: u32,
    pub tileset: Option<Arc<Tileset>>,
    pub horizontal_flip: bool,
    pub vertical_flip: bool,
    pub diagonal_flip: bool,
}

impl LayerTile {
    pub fn is_nil(&self) -> bool {
        self.tileset.is_none()
    }

    pub fn tileset_name(&self) -> &str {
        self.tileset.as_deref().map(|t| t.name.as_str()).unwrap_or_default()
    }

    pub fn rect(&self) -> (i32, i32, i32, i32) {
        match &self.tileset {
            Some(ts) => ts.tile_rect(self.id),
            None => (0, 0, 0, 0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Layer {
    pub name: String,
    pub width: usize,
    pub height: usize,
    pub properties: Properties,
    pub tiles: Vec<LayerTile>,
    empty: bool,
}

impl Layer {
    /// True when every cell is the nil tile.
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn tile_at(&self, x: usize, y: usize) -> Option<&LayerTile> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.tiles.get(y * self.width + x)
    }
}

#[derive(Debug, Clone)]
pub struct Map {
    pub orientation: String,
    pub width: i32,
    pub height: i32,
    pub tile_width: i32,
    pub tile_height: i32,
    pub properties: Properties,
    pub tilesets: Vec<Arc<Tileset>>,
    pub layers: Vec<Arc<Layer>>,
    base_dir: PathBuf,
}

fn int_attr(el: &Element, name: &str) -> Result<i32> {
    match el.attr(name) {
        None => Ok(0),
        Some(v) => v.trim().parse().map_err(|_| {
            Error::syntax(format!(
                "tiled: invalid {} attribute {:?} on <{}>",
                name, v, el.name
            ))
        }),
    }
}

fn parse_gid(s: &str) -> Result<u32> {
    s.trim()
        .parse()
        .map_err(|_| Error::syntax(format!("tiled: invalid tile gid {:?}", s)))
}

/// Lexical join of `base` and `file`, collapsing `.` and `..`.
fn join_clean(base: &Path, file: &str) -> String {
    let joined = if base.as_os_str().is_empty() {
        file.to_string()
    } else {
        format!("{}/{}", base.display(), file)
    };
    let rooted = joined.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in joined.split('/') {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&p) if p != ".." => {
                    parts.pop();
                }
                _ if rooted => {}
                _ => parts.push(".."),
            },
            p => parts.push(p),
        }
    }
    let body = parts.join("/");
    match (rooted, body.is_empty()) {
        (true, _) => format!("/{}", body),
        (false, true) => ".".to_string(),
        (false, false) => body,
    }
}

impl Map {
    pub fn load_file(path: &str) -> Result<Self> {
        let data = std::fs::read(path)?;
        let base_dir = Path::new(path).parent().map(Path::to_path_buf).unwrap_or_default();
        Self::load(base_dir, data)
    }

    /// Parse TMX from memory; external tilesets resolve against `base_dir`.
    pub fn load(base_dir: impl Into<PathBuf>, tmx: Vec<u8>) -> Result<Self> {
        let base_dir = base_dir.into();
        let root = parse_tree(tmx)?;
        if root.name != "map" {
            return Err(Error::syntax(format!("tiled: expected <map>, found <{}>", root.name)));
        }
        let width = int_attr(&root, "width")?;
        let height = int_attr(&root, "height")?;

        let mut tilesets = Vec::new();
        for el in root.children_named("tileset") {
            tilesets.push(Arc::new(Self::load_tileset(&base_dir, el)?));
        }
        let mut map = Self {
            orientation: root.attr("orientation").unwrap_or_default().to_string(),
            width,
            height,
            tile_width: int_attr(&root, "tilewidth")?,
            tile_height: int_attr(&root, "tileheight")?,
            properties: Properties::parse(&root),
            tilesets,
            layers: Vec::new(),
            base_dir,
        };
        for el in root.children_named("layer") {
            let layer = map.decode_layer(el)?;
            map.layers.push(Arc::new(layer));
        }
        tracing::debug!(
            base_dir = %map.base_dir.display(),
            tilesets = map.tilesets.len(),
            layers = map.layers.len(),
            "loaded tiled map"
        );
        Ok(map)
    }

    fn load_tileset(base_dir: &Path, el: &Element) -> Result<Tileset> {
        let first_gid = u32::try_from(int_attr(el, "firstgid")?)
            .map_err(|_| Error::syntax("tiled: negative firstgid"))?;
        let external;
        let def = match el.attr("source") {
            Some(source) => {
                let path = join_clean(base_dir, source);
                external = parse_tree(std::fs::read(&path)?)?;
                if external.name != "tileset" {
                    return Err(Error::syntax(format!("tiled: {}: expected <tileset>", path)));
                }
                &external
            }
            None => el,
        };
        let image_width = match def.child("image") {
            Some(img) => int_attr(img, "width")?,
            None => 0,
        };
        Ok(Tileset {
            first_gid,
            name: def.attr("name").unwrap_or_default().to_string(),
            tile_width: int_attr(def, "tilewidth")?,
            tile_height: int_attr(def, "tileheight")?,
            spacing: int_attr(def, "spacing")?,
            margin: int_attr(def, "margin")?,
            tile_count: int_attr(def, "tilecount")?,
            columns: int_attr(def, "columns")?,
            image_width,
        })
    }

    fn decode_layer(&self, el: &Element) -> Result<Layer> {
        let data = el
            .child("data")
            .ok_or_else(|| Error::syntax("tiled: missing layer data"))?;
        let gids = decode_data(data)?;
        let width = usize::try_from(self.width).unwrap_or(0);
        let height = usize::try_from(self.height).unwrap_or(0);
        if gids.len() != width * height {
            return Err(Error::syntax(format!(
                "tiled: invalid decoded tile count: got {}, want {}",
                gids.len(),
                width * height
            )));
        }
        let tiles = gids
            .into_iter()
            .map(|gid| self.gid_to_tile(gid))
            .collect::<Result<Vec<_>>>()?;
        let empty = tiles.iter().all(LayerTile::is_nil);
        Ok(Layer {
            name: el.attr("name").unwrap_or_default().to_string(),
            width,
            height,
            properties: Properties::parse(el),
            tiles,
            empty,
        })
    }

    /// Resolve a global tile id, masking off the flip bits. GID 0 is the
    /// nil tile; a GID below every tileset's `firstgid` is `RANGE`.
    pub fn gid_to_tile(&self, gid: u32) -> Result<LayerTile> {
        if gid == 0 {
            return Ok(LayerTile::default());
        }
        let bare = gid & !FLIP_MASK;
        let tileset = self
            .tilesets
            .iter()
            .rev()
            .find(|ts| ts.first_gid <= bare)
            .ok_or_else(|| Error::range(format!("tiled: invalid tile GID {}", bare)))?;
        Ok(LayerTile {
            id: bare - tileset.first_gid,
            tileset: Some(Arc::clone(tileset)),
            horizontal_flip: gid & FLIPPED_HORIZONTALLY != 0,
            vertical_flip: gid & FLIPPED_VERTICALLY != 0,
            diagonal_flip: gid & FLIPPED_DIAGONALLY != 0,
        })
    }

    pub fn file_full_path(&self, file: &str) -> String {
        join_clean(&self.base_dir, file)
    }
}

fn decode_data(data: &Element) -> Result<Vec<u32>> {
    let encoding = data.attr("encoding").unwrap_or_default();
    let gids = match encoding {
        "" => data
            .children_named("tile")
            .map(|t| t.attr("gid").map_or(Ok(0), parse_gid))
            .collect::<Result<Vec<_>>>()?,
        "csv" => data
            .text
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(parse_gid)
            .collect::<Result<Vec<_>>>()?,
        "base64" => {
            let text: String = data.text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            let packed = base64::engine::general_purpose::STANDARD
                .decode(text.as_bytes())
                .map_err(|e| Error::syntax(format!("tiled: {}", e)))?;
            let raw = match data.attr("compression").unwrap_or_default() {
                "" => packed,
                "zlib" => compress::zlib_decompress(&packed)?,
                "gzip" => compress::gzip_decompress(&packed)?,
                other => {
                    return Err(Error::syntax(format!(
                        "tiled: unknown data compression {:?}",
                        other
                    )))
                }
            };
            if raw.len() % 4 != 0 {
                return Err(Error::syntax("tiled: invalid decoded tile count"));
            }
            raw.chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        }
        other => return Err(Error::syntax(format!("tiled: unknown data encoding {:?}", other))),
    };
    if gids.is_empty() {
        return Err(Error::syntax("tiled: missing layer data"));
    }
    Ok(gids)
}

unsafe fn map_export(
    op: &str,
    out_map: *mut FatTiledMap,
    out_err: *mut FatError,
    load: impl FnOnce() -> Result<Map>,
) -> Status {
    let out_err = ffi::out_err(op, out_err);
    let out_map = raw::out(op, out_map, "out_map");
    *out_map = FatTiledMap::invalid();
    ffi::complete(op, out_err, load(), |m| *out_map = FatTiledMap::register(m))
}

/// Loads a TMX file; external tilesets resolve against its directory.
///
/// # Safety
///
/// `path` must be NUL-terminated; out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_TiledMapLoadFileUTF8(
    path: *const c_char,
    out_map: *mut FatTiledMap,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_TiledMapLoadFileUTF8";
    let path = raw::cstr_text(OP, path, "path");
    map_export(OP, out_map, out_err, || Map::load_file(&path))
}

/// # Safety
///
/// `base_dir` must be NUL-terminated; out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_TiledMapLoadReaderBytesUTF8(
    base_dir: *const c_char,
    tmx: FatBytes,
    out_map: *mut FatTiledMap,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_TiledMapLoadReaderBytesUTF8";
    let base_dir = raw::cstr_text(OP, base_dir, "base_dir").into_owned();
    let tmx = tmx.resolve(OP).as_slice().to_vec();
    map_export(OP, out_map, out_err, || Map::load(base_dir, tmx))
}

/// Releases the map. Layers and properties taken from it stay live.
#[no_mangle]
pub extern "C" fn fat_TiledMapFree(m: FatTiledMap) {
    m.release("fat_TiledMapFree");
}

/// Map width in tiles.
#[no_mangle]
pub extern "C" fn fat_TiledMapWidth(m: FatTiledMap) -> c_int {
    m.resolve("fat_TiledMapWidth").width
}

/// Map height in tiles.
#[no_mangle]
pub extern "C" fn fat_TiledMapHeight(m: FatTiledMap) -> c_int {
    m.resolve("fat_TiledMapHeight").height
}

/// Tile width in pixels.
#[no_mangle]
pub extern "C" fn fat_TiledMapTileWidth(m: FatTiledMap) -> c_int {
    m.resolve("fat_TiledMapTileWidth").tile_width
}

/// Tile height in pixels.
#[no_mangle]
pub extern "C" fn fat_TiledMapTileHeight(m: FatTiledMap) -> c_int {
    m.resolve("fat_TiledMapTileHeight").tile_height
}

/// Orientation attribute, such as `orthogonal`.
#[no_mangle]
pub extern "C" fn fat_TiledMapOrientation(m: FatTiledMap) -> FatString {
    new_string(m.resolve("fat_TiledMapOrientation").orientation.as_str())
}

/// `file` joined to the map's base directory.
///
/// # Safety
///
/// `file` must be NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn fat_TiledMapGetFileFullPathUTF8(
    m: FatTiledMap,
    file: *const c_char,
) -> FatString {
    const OP: &str = "fat_TiledMapGetFileFullPathUTF8";
    let file = raw::cstr_text(OP, file, "file");
    new_string(m.resolve(OP).file_full_path(&file))
}

/// Map-level custom properties.
#[no_mangle]
pub extern "C" fn fat_TiledMapProperties(m: FatTiledMap) -> FatTiledProperties {
    FatTiledProperties::register(m.resolve("fat_TiledMapProperties").properties.clone())
}

/// Number of tile layers.
#[no_mangle]
pub extern "C" fn fat_TiledMapLayerCount(m: FatTiledMap) -> usize {
    m.resolve("fat_TiledMapLayerCount").layers.len()
}

/// Tile layer `idx` in document order. Out of range is fatal.
#[no_mangle]
pub extern "C" fn fat_TiledMapLayerAt(m: FatTiledMap, idx: usize) -> FatTiledLayer {
    const OP: &str = "fat_TiledMapLayerAt";
    let map = m.resolve(OP);
    match map.layers.get(idx) {
        Some(layer) => FatTiledLayer::register_shared(Arc::clone(layer)),
        None => contract::violation(
            OP,
            format_args!("layer index {} out of range ({} layers)", idx, map.layers.len()),
        ),
    }
}

/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_TiledMapTileGIDToTile(
    m: FatTiledMap,
    gid: u32,
    out_tile: *mut FatTiledLayerTile,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_TiledMapTileGIDToTile";
    let out_err = ffi::out_err(OP, out_err);
    let out_tile = raw::out(OP, out_tile, "out_tile");
    *out_tile = FatTiledLayerTile::invalid();
    let result = m.resolve(OP).gid_to_tile(gid);
    ffi::complete(OP, out_err, result, |t| *out_tile = FatTiledLayerTile::register(t))
}

/// Releases the layer.
#[no_mangle]
pub extern "C" fn fat_TiledLayerFree(l: FatTiledLayer) {
    l.release("fat_TiledLayerFree");
}

/// Layer name.
#[no_mangle]
pub extern "C" fn fat_TiledLayerName(l: FatTiledLayer) -> FatString {
    new_string(l.resolve("fat_TiledLayerName").name.as_str())
}

/// Reports whether every tile of the layer is nil.
#[no_mangle]
pub extern "C" fn fat_TiledLayerIsEmpty(l: FatTiledLayer) -> bool {
    l.resolve("fat_TiledLayerIsEmpty").is_empty()
}

/// Layer custom properties.
#[no_mangle]
pub extern "C" fn fat_TiledLayerProperties(l: FatTiledLayer) -> FatTiledProperties {
    FatTiledProperties::register(l.resolve("fat_TiledLayerProperties").properties.clone())
}

/// Tile at `(x, y)`. Coordinates outside the layer are fatal.
#[no_mangle]
pub extern "C" fn fat_TiledLayerTileAt(l: FatTiledLayer, x: c_int, y: c_int) -> FatTiledLayerTile {
    const OP: &str = "fat_TiledLayerTileAt";
    let layer = l.resolve(OP);
    let (cx, cy) = (contract::index(OP, x as isize, "x"), contract::index(OP, y as isize, "y"));
    match layer.tile_at(cx, cy) {
        Some(tile) => FatTiledLayerTile::register(tile.clone()),
        None => contract::violation(
            OP,
            format_args!("({}, {}) outside {}x{} layer", x, y, layer.width, layer.height),
        ),
    }
}

/// Releases the tile.
#[no_mangle]
pub extern "C" fn fat_TiledLayerTileFree(t: FatTiledLayerTile) {
    t.release("fat_TiledLayerTileFree");
}

/// Reports whether the cell is empty (GID 0).
#[no_mangle]
pub extern "C" fn fat_TiledLayerTileIsNil(t: FatTiledLayerTile) -> bool {
    t.resolve("fat_TiledLayerTileIsNil").is_nil()
}

/// Tile id local to its tileset (GID minus `firstgid`).
#[no_mangle]
pub extern "C" fn fat_TiledLayerTileID(t: FatTiledLayerTile) -> u32 {
    t.resolve("fat_TiledLayerTileID").id
}

/// Name of the owning tileset, empty for the nil tile.
#[no_mangle]
pub extern "C" fn fat_TiledLayerTileTilesetName(t: FatTiledLayerTile) -> FatString {
    new_string(t.resolve("fat_TiledLayerTileTilesetName").tileset_name())
}

/// Source rectangle in the tileset image; all zero for the nil tile.
///
/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_TiledLayerTileRect(
    t: FatTiledLayerTile,
    out_x: *mut c_int,
    out_y: *mut c_int,
    out_w: *mut c_int,
    out_h: *mut c_int,
) {
    const OP: &str = "fat_TiledLayerTileRect";
    let out_x = raw::out(OP, out_x, "out_x");
    let out_y = raw::out(OP, out_y, "out_y");
    let out_w = raw::out(OP, out_w, "out_w");
    let out_h = raw::out(OP, out_h, "out_h");
    (*out_x, *out_y, *out_w, *out_h) = t.resolve(OP).rect();
}

fn property_name(op: &str, name: FatString) -> String {
    name.resolve(op).to_str_lossy().into_owned()
}

/// Every value stored under `name`, in document order.
#[no_mangle]
pub extern "C" fn fat_TiledPropertiesGet(p: FatTiledProperties, name: FatString) -> FatStringArray {
    const OP: &str = "fat_TiledPropertiesGet";
    let name = property_name(OP, name);
    let values = p.resolve(OP).get(&name).into_iter().map(|v| v.as_bytes().to_vec()).collect();
    FatStringArray::register(TextArray::new(values))
}

/// First value under `name`, or an empty string.
#[no_mangle]
pub extern "C" fn fat_TiledPropertiesGetString(
    p: FatTiledProperties,
    name: FatString,
) -> FatString {
    const OP: &str = "fat_TiledPropertiesGetString";
    let name = property_name(OP, name);
    new_string(p.resolve(OP).get_string(&name))
}

/// First value under `name` as an integer, 0 when missing or malformed.
#[no_mangle]
pub extern "C" fn fat_TiledPropertiesGetInt(p: FatTiledProperties, name: FatString) -> i64 {
    const OP: &str = "fat_TiledPropertiesGetInt";
    let name = property_name(OP, name);
    p.resolve(OP).get_int(&name)
}

/// First value under `name` as a float, 0 when missing or malformed.
#[no_mangle]
pub extern "C" fn fat_TiledPropertiesGetFloat(p: FatTiledProperties, name: FatString) -> f64 {
    const OP: &str = "fat_TiledPropertiesGetFloat";
    let name = property_name(OP, name);
    p.resolve(OP).get_float(&name)
}

/// First value under `name` as a bool, false when missing or malformed.
#[no_mangle]
pub extern "C" fn fat_TiledPropertiesGetBool(p: FatTiledProperties, name: FatString) -> bool {
    const OP: &str = "fat_TiledPropertiesGetBool";
    let name = property_name(OP, name);
    p.resolve(OP).get_bool(&name)
}

/// Releases the property set.
#[no_mangle]
pub extern "C" fn fat_TiledPropertiesFree(p: FatTiledProperties) {
    p.release("fat_TiledPropertiesFree");
}
