//! Tiled maps loaded from disk and from memory.

mod common;

use common::{bytes, cstr, string, take_error, take_string};
use fatstd::bytes::fat_BytesFree;
use fatstd::string::{fat_StringArrayFree, fat_StringArrayLen, fat_StringFree};
use fatstd::tiled::*;
use fatstd::{FatError, FatTiledLayerTile, FatTiledMap, Status};

const TSX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tileset version="1.10" name="dungeon" tilewidth="16" tileheight="16" tilecount="16" columns="4">
 <image source="dungeon.png" width="64" height="64"/>
</tileset>"#;

const TMX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<map version="1.10" orientation="orthogonal" renderorder="right-down" width="2" height="2" tilewidth="16" tileheight="16">
 <properties>
  <property name="music" value="cave.ogg"/>
  <property name="gravity" type="float" value="9.5"/>
  <property name="lives" type="int" value="3"/>
  <property name="dark" type="bool" value="true"/>
 </properties>
 <tileset firstgid="10" source="tiles/dungeon.tsx"/>
 <layer id="1" name="floor" width="2" height="2">
  <data encoding="csv">
10,0,0,11
</data>
 </layer>
 <layer id="2" name="overlay" width="2" height="2">
  <data encoding="csv">0,0,0,0</data>
 </layer>
</map>"#;

fn write_fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("tiles")).unwrap();
    std::fs::write(dir.path().join("tiles/dungeon.tsx"), TSX).unwrap();
    std::fs::write(dir.path().join("level.tmx"), TMX).unwrap();
    dir
}

fn load_file(path: &str) -> Result<FatTiledMap, Status> {
    let p = cstr(path);
    let mut m = FatTiledMap::invalid();
    let mut err = FatError::invalid();
    match unsafe { fat_TiledMapLoadFileUTF8(p.as_ptr(), &mut m, &mut err) } {
        Status::Ok => Ok(m),
        status => {
            assert!(!m.is_valid());
            take_error(err, status);
            Err(status)
        }
    }
}

#[test]
fn test_load_file() {
    let dir = write_fixture();
    let m = load_file(dir.path().join("level.tmx").to_str().unwrap()).unwrap();

    assert_eq!(fat_TiledMapWidth(m), 2);
    assert_eq!(fat_TiledMapHeight(m), 2);
    assert_eq!(fat_TiledMapTileWidth(m), 16);
    assert_eq!(fat_TiledMapTileHeight(m), 16);
    assert_eq!(take_string(fat_TiledMapOrientation(m)), "orthogonal");
    assert_eq!(fat_TiledMapLayerCount(m), 2);

    let file = cstr("dungeon.png");
    let full = take_string(unsafe { fat_TiledMapGetFileFullPathUTF8(m, file.as_ptr()) });
    assert_eq!(full, format!("{}/dungeon.png", dir.path().display()));

    let floor = fat_TiledMapLayerAt(m, 0);
    assert_eq!(take_string(fat_TiledLayerName(floor)), "floor");
    assert!(!fat_TiledLayerIsEmpty(floor));

    let t = fat_TiledLayerTileAt(floor, 0, 0);
    assert!(!fat_TiledLayerTileIsNil(t));
    assert_eq!(fat_TiledLayerTileID(t), 0);
    assert_eq!(take_string(fat_TiledLayerTileTilesetName(t)), "dungeon");
    fat_TiledLayerTileFree(t);

    let t = fat_TiledLayerTileAt(floor, 1, 1);
    assert_eq!(fat_TiledLayerTileID(t), 1);
    let (mut x, mut y, mut w, mut h) = (0, 0, 0, 0);
    unsafe { fat_TiledLayerTileRect(t, &mut x, &mut y, &mut w, &mut h) };
    assert_eq!((x, y, w, h), (16, 0, 16, 16));
    fat_TiledLayerTileFree(t);

    let t = fat_TiledLayerTileAt(floor, 1, 0);
    assert!(fat_TiledLayerTileIsNil(t));
    assert_eq!(take_string(fat_TiledLayerTileTilesetName(t)), "");
    fat_TiledLayerTileFree(t);
    fat_TiledLayerFree(floor);

    let overlay = fat_TiledMapLayerAt(m, 1);
    assert!(fat_TiledLayerIsEmpty(overlay));
    fat_TiledLayerFree(overlay);

    fat_TiledMapFree(m);
}

#[test]
fn test_properties() {
    let dir = write_fixture();
    let m = load_file(dir.path().join("level.tmx").to_str().unwrap()).unwrap();
    let p = fat_TiledMapProperties(m);

    let name = string("music");
    assert_eq!(take_string(fat_TiledPropertiesGetString(p, name)), "cave.ogg");
    let all = fat_TiledPropertiesGet(p, name);
    assert_eq!(fat_StringArrayLen(all), 1);
    fat_StringArrayFree(all);
    fat_StringFree(name);

    let name = string("gravity");
    assert_eq!(fat_TiledPropertiesGetFloat(p, name), 9.5);
    fat_StringFree(name);
    let name = string("lives");
    assert_eq!(fat_TiledPropertiesGetInt(p, name), 3);
    fat_StringFree(name);
    let name = string("dark");
    assert!(fat_TiledPropertiesGetBool(p, name));
    fat_StringFree(name);
    let name = string("absent");
    assert_eq!(take_string(fat_TiledPropertiesGetString(p, name)), "");
    let all = fat_TiledPropertiesGet(p, name);
    assert_eq!(fat_StringArrayLen(all), 0);
    fat_StringArrayFree(all);
    fat_StringFree(name);

    fat_TiledPropertiesFree(p);
    fat_TiledMapFree(m);
}

#[test]
fn test_load_from_bytes_and_gid_lookup() {
    let dir = write_fixture();
    let base = cstr(dir.path().to_str().unwrap());
    let tmx = bytes(TMX.as_bytes());
    let mut m = FatTiledMap::invalid();
    let mut err = FatError::invalid();
    assert_eq!(
        unsafe { fat_TiledMapLoadReaderBytesUTF8(base.as_ptr(), tmx, &mut m, &mut err) },
        Status::Ok
    );
    fat_BytesFree(tmx);

    let mut tile = FatTiledLayerTile::invalid();
    assert_eq!(
        unsafe { fat_TiledMapTileGIDToTile(m, 12 | 0x8000_0000, &mut tile, &mut err) },
        Status::Ok
    );
    assert_eq!(fat_TiledLayerTileID(tile), 2);
    fat_TiledLayerTileFree(tile);

    let status = unsafe { fat_TiledMapTileGIDToTile(m, 2, &mut tile, &mut err) };
    assert_eq!(status, Status::Range);
    assert!(!tile.is_valid());
    take_error(err, Status::Range);
    fat_TiledMapFree(m);
}

#[test]
fn test_load_errors() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(load_file(dir.path().join("nope.tmx").to_str().unwrap()), Err(Status::Other));

    let broken = dir.path().join("broken.tmx");
    std::fs::write(
        &broken,
        r#"<map width="1" height="1"><layer><data encoding="csv">1"#,
    )
    .unwrap();
    assert_eq!(load_file(broken.to_str().unwrap()), Err(Status::Syntax));

    let missing_tsx = dir.path().join("missing.tmx");
    std::fs::write(&missing_tsx, TMX).unwrap();
    assert_eq!(load_file(missing_tsx.to_str().unwrap()), Err(Status::Other));
}
