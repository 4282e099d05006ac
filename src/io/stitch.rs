use crate::io::dem::{format_lat, format_lon, DemDescriptor, DemSource, DemStitcher, StitchRequest};
use crate::types::{TopoError, TopoResult};
use flate2::read::GzDecoder;
use std::collections::HashMap;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Downloads and mosaics 1x1 degree SRTM tiles into a raw elevation grid
///
/// Implements [`DemStitcher`] against public SRTM mirrors. Tiles already
/// present in the download directory are reused without a network round
/// trip; tiles no mirror can provide are zero-filled (ocean).
pub struct SrtmStitcher {
    client: reqwest::blocking::Client,
    max_retries: usize,
}

impl SrtmStitcher {
    pub fn new() -> TopoResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(300))
            .user_agent("topomask/0.2 (SAR geometry tool)")
            .build()
            .map_err(|e| {
                TopoError::DemAcquisition(format!("failed to create HTTP client: {}", e))
            })?;
        Ok(Self {
            client,
            max_retries: 3,
        })
    }

    /// Try each mirror in order; `None` when every mirror failed
    fn fetch_tile(&self, lat: i32, lon: i32, source: DemSource) -> Option<Vec<u8>> {
        let tile = tile_name(lat, lon);
        let urls = tile_urls(lat, lon, source);
        for (i, url) in urls.iter().enumerate() {
            log::info!(
                "Downloading tile {} (source {} of {}): {}",
                tile,
                i + 1,
                urls.len(),
                url
            );
            match self.download_with_retries(url) {
                Ok(bytes) => return Some(bytes),
                Err(e) => log::warn!("Tile {}: source {} failed: {}", tile, i + 1, e),
            }
        }
        None
    }

    fn download_with_retries(&self, url: &str) -> TopoResult<Vec<u8>> {
        let mut last_error = None;
        for attempt in 1..=self.max_retries {
            match self.download_once(url) {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        log::debug!("Attempt {} of {} failed, retrying", attempt, self.max_retries);
                        std::thread::sleep(Duration::from_secs(2));
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            TopoError::DemAcquisition(format!("download failed: {}", url))
        }))
    }

    /// One HTTP round trip, payload unpacked to raw `.hgt` bytes
    fn download_once(&self, url: &str) -> TopoResult<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| TopoError::DemAcquisition(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(TopoError::DemAcquisition(format!(
                "HTTP {} for {}",
                response.status().as_u16(),
                url
            )));
        }

        let content = response
            .bytes()
            .map_err(|e| TopoError::DemAcquisition(format!("failed to read response body: {}", e)))?;

        // Anything this small is an error page, not elevation data
        if content.len() < 1024 {
            return Err(TopoError::DemAcquisition(format!(
                "payload too small ({} bytes)",
                content.len()
            )));
        }

        unpack_payload(&content)
    }
}

impl DemStitcher for SrtmStitcher {
    fn stitch(&self, request: &StitchRequest) -> TopoResult<bool> {
        let dim = tile_posts(request.source)?;
        let [south, north] = request.lat;
        let [west, east] = request.lon;
        if north <= south || east <= west {
            return Err(TopoError::DemAcquisition(format!(
                "degenerate stitch bounds: lat [{}, {}], lon [{}, {}]",
                south, north, west, east
            )));
        }
        std::fs::create_dir_all(&request.download_dir)?;

        let mut tiles: HashMap<(i32, i32), Vec<i16>> = HashMap::new();
        let mut downloaded: Vec<PathBuf> = Vec::new();
        for lat in south..north {
            for lon in west..east {
                let tile = tile_name(lat, lon);
                let tile_path = request.download_dir.join(format!("{}.hgt", tile));
                if tile_path.is_file() {
                    log::debug!("Reusing cached tile {}", tile_path.display());
                    let bytes = std::fs::read(&tile_path)?;
                    tiles.insert((lat, lon), decode_hgt(&bytes, dim, &tile)?);
                    continue;
                }
                match self.fetch_tile(lat, lon, request.source) {
                    Some(bytes) => {
                        let samples = decode_hgt(&bytes, dim, &tile)?;
                        std::fs::write(&tile_path, &bytes)?;
                        downloaded.push(tile_path);
                        tiles.insert((lat, lon), samples);
                    }
                    None => log::warn!("No mirror provided tile {}; filling with zeros", tile),
                }
            }
        }

        if tiles.is_empty() {
            log::warn!(
                "No SRTM tiles available for lat [{}, {}], lon [{}, {}]",
                south,
                north,
                west,
                east
            );
            return Ok(false);
        }

        let posts_per_degree = dim - 1;
        let width = (east - west) as usize * posts_per_degree;
        let length = (north - south) as usize * posts_per_degree;
        let mosaic = mosaic_tiles(&tiles, request.lat, request.lon, dim);

        let mosaic_path = request.download_dir.join(&request.name);
        write_raw_i16(&mosaic_path, &mosaic)?;
        log::info!(
            "Wrote DEM mosaic {} ({}x{} posts from {} of {} tiles)",
            mosaic_path.display(),
            width,
            length,
            tiles.len(),
            ((north - south) * (east - west)) as usize
        );

        if request.write_descriptor {
            let descriptor = DemDescriptor {
                width,
                length,
                first_latitude: f64::from(north),
                first_longitude: f64::from(west),
                delta_latitude: -1.0 / posts_per_degree as f64,
                delta_longitude: 1.0 / posts_per_degree as f64,
                no_data_value: None,
                datum: Some("EGM96".to_string()),
            };
            descriptor.write_for(&mosaic_path)?;
        }

        if !request.keep_tiles {
            for path in downloaded {
                if let Err(e) = std::fs::remove_file(&path) {
                    log::warn!("Failed to remove tile {}: {}", path.display(), e);
                }
            }
        }

        Ok(true)
    }
}

/// Posts per tile edge for a source catalog
fn tile_posts(source: DemSource) -> TopoResult<usize> {
    match source {
        DemSource::SRTM1 => Ok(3601),
        DemSource::SRTM3 => Ok(1201),
        other => Err(TopoError::DemAcquisition(format!(
            "unsupported DEM source catalog: {}",
            other
        ))),
    }
}

/// SRTM tile name for the cell whose south-west corner is (lat, lon),
/// e.g. `N50E012`
pub(crate) fn tile_name(lat: i32, lon: i32) -> String {
    format!("{}{}", format_lat(lat), format_lon(lon))
}

/// Mirror URLs in order of preference
fn tile_urls(lat: i32, lon: i32, source: DemSource) -> Vec<String> {
    let tile = tile_name(lat, lon);
    match source {
        DemSource::SRTM1 => vec![
            // AWS skadi layout shards tiles by latitude band: /N50/N50E012.hgt.gz
            format!(
                "https://s3.amazonaws.com/elevation-tiles-prod/skadi/{}/{}.hgt.gz",
                format_lat(lat),
                tile
            ),
            format!(
                "https://dds.cr.usgs.gov/srtm/version2_1/SRTM1/{}/{}.hgt.zip",
                srtm_continent(lat, lon),
                tile
            ),
        ],
        DemSource::SRTM3 => vec![format!(
            "https://dds.cr.usgs.gov/srtm/version2_1/SRTM3/{}/{}.hgt.zip",
            srtm_continent(lat, lon),
            tile
        )],
        _ => Vec::new(),
    }
}

/// Coarse continent shard used by the USGS mirror's directory layout
fn srtm_continent(lat: i32, lon: i32) -> &'static str {
    if lat >= 0 {
        if lon < 0 {
            "North_America"
        } else {
            "Eurasia"
        }
    } else if lon < 0 {
        "South_America"
    } else if lat >= -20 {
        "Africa"
    } else {
        "Australia"
    }
}

fn is_gzip(content: &[u8]) -> bool {
    content.len() >= 2 && content[0] == 0x1F && content[1] == 0x8B
}

fn is_zip(content: &[u8]) -> bool {
    content.len() >= 4 && content[0..4] == [0x50, 0x4B, 0x03, 0x04]
}

/// Unpack a mirror payload to raw `.hgt` bytes, sniffing by magic bytes
fn unpack_payload(content: &[u8]) -> TopoResult<Vec<u8>> {
    if is_gzip(content) {
        let mut decoder = GzDecoder::new(content);
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| TopoError::DemAcquisition(format!("gzip decompression failed: {}", e)))?;
        Ok(decompressed)
    } else if is_zip(content) {
        extract_zip_hgt(content)
    } else {
        Ok(content.to_vec())
    }
}

/// Pull the first `.hgt` entry out of a zip payload
fn extract_zip_hgt(zip_data: &[u8]) -> TopoResult<Vec<u8>> {
    let reader = std::io::Cursor::new(zip_data);
    let mut archive = zip::ZipArchive::new(reader)
        .map_err(|e| TopoError::DemAcquisition(format!("failed to open zip archive: {}", e)))?;

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| TopoError::DemAcquisition(format!("failed to read zip entry {}: {}", i, e)))?;
        if file.name().ends_with(".hgt") {
            log::debug!("Extracting {}", file.name());
            let mut buffer = Vec::new();
            std::io::copy(&mut file, &mut buffer)?;
            return Ok(buffer);
        }
    }

    Err(TopoError::DemAcquisition(
        "no .hgt entry in zip archive".to_string(),
    ))
}

/// Decode big-endian `.hgt` samples, validating the byte count
fn decode_hgt(bytes: &[u8], dim: usize, tile: &str) -> TopoResult<Vec<i16>> {
    let expected = dim * dim * 2;
    if bytes.len() != expected {
        return Err(TopoError::DemAcquisition(format!(
            "tile {}: expected {} bytes, got {}",
            tile,
            expected,
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|c| i16::from_be_bytes([c[0], c[1]]))
        .collect())
}

/// Assemble tiles into one north-first row-major grid
///
/// Adjacent tiles share their edge posts; each tile contributes `dim - 1`
/// rows and columns so shared edges appear once. Cells with no tile stay
/// zero.
fn mosaic_tiles(
    tiles: &HashMap<(i32, i32), Vec<i16>>,
    lat: [i32; 2],
    lon: [i32; 2],
    dim: usize,
) -> Vec<i16> {
    let ppd = dim - 1;
    let width = (lon[1] - lon[0]) as usize * ppd;
    let length = (lat[1] - lat[0]) as usize * ppd;
    let mut mosaic = vec![0i16; width * length];

    for (cell_row, cell_lat) in (lat[0]..lat[1]).rev().enumerate() {
        for (cell_col, cell_lon) in (lon[0]..lon[1]).enumerate() {
            let tile = match tiles.get(&(cell_lat, cell_lon)) {
                Some(t) => t,
                None => continue,
            };
            for r in 0..ppd {
                let src = r * dim;
                let dst = (cell_row * ppd + r) * width + cell_col * ppd;
                mosaic[dst..dst + ppd].copy_from_slice(&tile[src..src + ppd]);
            }
        }
    }

    mosaic
}

/// Write samples as little-endian raw, the layout the descriptor announces
fn write_raw_i16(path: &Path, samples: &[i16]) -> TopoResult<()> {
    let file = std::fs::File::create(path)?;
    let mut writer = BufWriter::new(file);
    for v in samples {
        writer.write_all(&v.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_tile_name_padding() {
        assert_eq!(tile_name(50, 12), "N50E012");
        assert_eq!(tile_name(-1, -72), "S01W072");
        assert_eq!(tile_name(37, -122), "N37W122");
        assert_eq!(tile_name(-33, 18), "S33E018");
    }

    #[test]
    fn test_tile_posts_by_catalog() {
        assert_eq!(tile_posts(DemSource::SRTM1).unwrap(), 3601);
        assert_eq!(tile_posts(DemSource::SRTM3).unwrap(), 1201);
        let err = tile_posts(DemSource(7)).unwrap_err();
        assert!(matches!(err, TopoError::DemAcquisition(_)));
    }

    #[test]
    fn test_tile_urls_by_catalog() {
        let urls = tile_urls(50, 12, DemSource::SRTM1);
        assert_eq!(urls.len(), 2);
        assert!(urls[0].contains("skadi/N50/N50E012.hgt.gz"));
        assert!(urls[1].contains("SRTM1/Eurasia/N50E012.hgt.zip"));

        let urls = tile_urls(-32, -64, DemSource::SRTM3);
        assert_eq!(urls.len(), 1);
        assert!(urls[0].contains("SRTM3/South_America/S32W064.hgt.zip"));
    }

    #[test]
    fn test_decode_hgt_big_endian_with_size_check() {
        let bytes = [0x01, 0x00, 0xFF, 0x9C, 0x00, 0x10, 0x00, 0x00];
        let samples = decode_hgt(&bytes, 2, "N00E000").unwrap();
        assert_eq!(samples, vec![256, -100, 16, 0]);

        let err = decode_hgt(&bytes[..6], 2, "N00E000").unwrap_err();
        assert!(matches!(err, TopoError::DemAcquisition(_)));
    }

    #[test]
    fn test_payload_magic_detection() {
        assert!(is_gzip(&[0x1F, 0x8B, 0x08, 0x00]));
        assert!(!is_gzip(&[0x50, 0x4B, 0x03, 0x04]));
        assert!(is_zip(b"PK\x03\x04rest"));
        assert!(!is_zip(b"PK\x05\x06"));
    }

    #[test]
    fn test_unpack_gzip_payload() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let raw = vec![7u8; 64];
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw).unwrap();
        let packed = encoder.finish().unwrap();

        assert_eq!(unpack_payload(&packed).unwrap(), raw);
    }

    #[test]
    fn test_unpack_raw_payload_passes_through() {
        let raw = vec![1u8, 2, 3, 4];
        assert_eq!(unpack_payload(&raw).unwrap(), raw);
    }

    fn constant_tile(dim: usize, value: i16) -> Vec<i16> {
        vec![value; dim * dim]
    }

    #[test]
    fn test_mosaic_dedups_horizontal_edge() {
        let dim = 4;
        let mut tiles = HashMap::new();
        tiles.insert((37, -123), constant_tile(dim, 1));
        tiles.insert((37, -122), constant_tile(dim, 2));

        let mosaic = mosaic_tiles(&tiles, [37, 38], [-123, -121], dim);
        let width = 2 * (dim - 1);
        assert_eq!(mosaic.len(), width * (dim - 1));
        for row in 0..dim - 1 {
            assert_eq!(&mosaic[row * width..row * width + 3], &[1, 1, 1]);
            assert_eq!(&mosaic[row * width + 3..row * width + 6], &[2, 2, 2]);
        }
    }

    #[test]
    fn test_mosaic_is_north_first_with_zero_fill() {
        let dim = 4;
        let mut tiles = HashMap::new();
        // Northern cell present, southern cell missing
        tiles.insert((38, -122), constant_tile(dim, 5));

        let mosaic = mosaic_tiles(&tiles, [37, 39], [-122, -121], dim);
        let width = dim - 1;
        assert_eq!(mosaic.len(), width * 2 * (dim - 1));
        assert!(mosaic[..width * 3].iter().all(|&v| v == 5));
        assert!(mosaic[width * 3..].iter().all(|&v| v == 0));
    }

    #[test]
    fn test_mosaic_reads_tile_rows_north_first() {
        let dim = 3;
        // Tile rows 0,1,2 hold values 10,20,30; row 0 is the tile's north edge
        let tile: Vec<i16> = vec![10, 10, 10, 20, 20, 20, 30, 30, 30];
        let mut tiles = HashMap::new();
        tiles.insert((0, 0), tile);

        let mosaic = mosaic_tiles(&tiles, [0, 1], [0, 1], dim);
        assert_eq!(mosaic, vec![10, 10, 20, 20]);
    }

    #[test]
    fn test_write_raw_i16_is_little_endian() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mosaic.dem.wgs84");
        write_raw_i16(&path, &[256, -1]).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![0x00, 0x01, 0xFF, 0xFF]);
    }

    #[test]
    fn test_stitch_rejects_degenerate_bounds() {
        let dir = TempDir::new().unwrap();
        let stitcher = SrtmStitcher::new().unwrap();
        let request = StitchRequest {
            lat: [37, 37],
            lon: [-122, -121],
            source: DemSource::SRTM1,
            name: "empty.dem.wgs84".to_string(),
            download_dir: dir.path().to_path_buf(),
            keep_tiles: true,
            write_descriptor: false,
        };
        let err = stitcher.stitch(&request).unwrap_err();
        assert!(matches!(err, TopoError::DemAcquisition(_)));
    }

    #[test]
    fn test_stitch_from_cached_tiles_writes_mosaic_and_descriptor() {
        let dir = TempDir::new().unwrap();
        let dim = 1201usize;

        // Pre-seed the single SRTM3 tile so no network is touched
        let mut tile_bytes = Vec::with_capacity(dim * dim * 2);
        for _ in 0..dim * dim {
            tile_bytes.extend_from_slice(&100i16.to_be_bytes());
        }
        std::fs::write(dir.path().join("N37W122.hgt"), &tile_bytes).unwrap();

        let stitcher = SrtmStitcher::new().unwrap();
        let request = StitchRequest {
            lat: [37, 38],
            lon: [-122, -121],
            source: DemSource::SRTM3,
            name: "demLat_N37_N38_Lon_W122_W121.dem.wgs84".to_string(),
            download_dir: dir.path().to_path_buf(),
            keep_tiles: true,
            write_descriptor: true,
        };
        assert!(stitcher.stitch(&request).unwrap());

        let mosaic_path = dir.path().join(&request.name);
        let metadata = std::fs::metadata(&mosaic_path).unwrap();
        assert_eq!(metadata.len(), (1200 * 1200 * 2) as u64);

        let descriptor =
            DemDescriptor::from_file(crate::io::dem::descriptor_path(&mosaic_path)).unwrap();
        assert_eq!(descriptor.width, 1200);
        assert_eq!(descriptor.length, 1200);
        assert_eq!(descriptor.first_latitude, 38.0);
        assert_eq!(descriptor.first_longitude, -122.0);
        assert!((descriptor.delta_longitude - 1.0 / 1200.0).abs() < 1e-12);

        // Cached tile untouched
        assert!(dir.path().join("N37W122.hgt").is_file());
    }
}
