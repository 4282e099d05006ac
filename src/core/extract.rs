use crate::io::product::{BurstProduct, BurstRecord, FrameProduct, ParsedProduct, ReaderShape};
use crate::types::{BurstRange, GeometryTask, LookSide, TopoError, TopoResult};
use std::sync::Arc;

/// Turns a parsed product into the ordered list of geometry tasks
///
/// One task per burst for burst-mode products (optionally restricted to a
/// 1-based inclusive range), or exactly one whole-frame task. Extraction is
/// pure: it validates metadata and builds tasks, nothing else.
pub struct TaskExtractor;

impl TaskExtractor {
    pub fn extract(
        product: &ParsedProduct,
        burst_range: Option<BurstRange>,
    ) -> TopoResult<Vec<GeometryTask>> {
        match &product.shape {
            ReaderShape::Bursts(bursts) => Self::extract_bursts(product, bursts, burst_range),
            ReaderShape::Frame(frame) => {
                if burst_range.is_some() {
                    return Err(TopoError::InvalidRange(
                        "burst selection applies only to burst-mode products".to_string(),
                    ));
                }
                Self::extract_frame(product, frame)
            }
        }
    }

    fn extract_bursts(
        product: &ParsedProduct,
        bursts: &BurstProduct,
        range: Option<BurstRange>,
    ) -> TopoResult<Vec<GeometryTask>> {
        let count = bursts.bursts.len();
        if count == 0 {
            return Err(TopoError::EmptyResult(format!(
                "{}: product contains no bursts",
                product.label
            )));
        }
        let range = range.unwrap_or_else(|| BurstRange::new(1, count));
        if range.start < 1 || range.stop < range.start || range.stop > count {
            return Err(TopoError::InvalidRange(format!(
                "burst range {}-{} out of bounds; product provides {} bursts",
                range.start, range.stop, count
            )));
        }

        let look_side = if bursts.sensor.right_looking_by_construction() {
            LookSide::Right
        } else {
            bursts.look_side.ok_or_else(|| {
                TopoError::Metadata(format!(
                    "{}: platform pointing not recorded in product metadata",
                    product.label
                ))
            })?
        };

        let mut tasks = Vec::with_capacity(range.stop - range.start + 1);
        for index in range.start..=range.stop {
            let record = &bursts.bursts[index - 1];
            let prf = burst_prf(record).ok_or_else(|| {
                TopoError::Metadata(format!(
                    "burst {}: neither PRF nor azimuth time interval recorded",
                    index
                ))
            })?;
            // Tags keep the absolute burst index so subranges stay traceable
            let tag = format!("{:02}", index);
            let task = GeometryTask {
                label: format!("burst_{}", tag),
                tag,
                width: record.samples,
                length: record.lines,
                range_pixel_spacing: record.range_pixel_spacing,
                prf,
                radar_wavelength: record.radar_wavelength,
                orbit: Arc::clone(&record.orbit),
                sensing_start: record.sensing_start,
                starting_range: record.starting_range,
                look_side,
                polarization: product.polarization,
            };
            task.validate()?;
            tasks.push(task);
        }

        log::debug!(
            "{}: extracted {} geometry tasks (bursts {}..{})",
            product.label,
            tasks.len(),
            range.start,
            range.stop
        );
        Ok(tasks)
    }

    fn extract_frame(
        product: &ParsedProduct,
        frame: &FrameProduct,
    ) -> TopoResult<Vec<GeometryTask>> {
        let record = &frame.frame;
        let task = GeometryTask {
            label: "frame".to_string(),
            tag: "frame".to_string(),
            width: record.samples,
            length: record.lines,
            range_pixel_spacing: record.range_pixel_spacing,
            prf: record.prf,
            radar_wavelength: record.radar_wavelength,
            orbit: Arc::clone(&record.orbit),
            sensing_start: record.sensing_start,
            starting_range: record.starting_range,
            look_side: record.pointing,
            polarization: product.polarization,
        };
        task.validate()?;
        log::debug!("{}: extracted whole-frame geometry task", product.label);
        Ok(vec![task])
    }
}

/// PRF as recorded, or the reciprocal of the azimuth line interval
fn burst_prf(record: &BurstRecord) -> Option<f64> {
    record
        .prf
        .or_else(|| record.azimuth_time_interval.map(|dt| 1.0 / dt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::product::SensorKind;
    use crate::types::{BoundingBox, OrbitData, Polarization};
    use chrono::Utc;

    fn orbit() -> Arc<OrbitData> {
        Arc::new(OrbitData {
            state_vectors: Vec::new(),
            reference_time: Utc::now(),
        })
    }

    fn burst(prf: Option<f64>, interval: Option<f64>) -> BurstRecord {
        BurstRecord {
            samples: 25_483,
            lines: 1_507,
            range_pixel_spacing: 2.329_562,
            prf,
            azimuth_time_interval: interval,
            radar_wavelength: 0.055_465_76,
            orbit: orbit(),
            sensing_start: Utc::now(),
            starting_range: 803_347.0,
        }
    }

    fn burst_product(n: usize) -> ParsedProduct {
        ParsedProduct {
            label: "IW1".to_string(),
            polarization: Some(Polarization::VV),
            shape: ReaderShape::Bursts(BurstProduct {
                sensor: SensorKind::Sentinel1,
                bbox: BoundingBox::new(37.0, 38.2, -122.5, -121.3),
                bursts: (0..n).map(|_| burst(Some(486.486), None)).collect(),
                look_side: None,
            }),
        }
    }

    fn frame_product(pointing: LookSide) -> ParsedProduct {
        ParsedProduct {
            label: "frame".to_string(),
            polarization: Some(Polarization::HH),
            shape: ReaderShape::Frame(FrameProduct {
                sensor: SensorKind::Saocom,
                frame: crate::io::product::FrameRecord {
                    samples: 9_874,
                    lines: 18_322,
                    range_pixel_spacing: 4.999_862,
                    prf: 1_650.0,
                    radar_wavelength: 0.234_9,
                    orbit: orbit(),
                    sensing_start: Utc::now(),
                    starting_range: 901_234.0,
                    pointing,
                    corners: [
                        (-31.2, -64.5),
                        (-31.4, -63.9),
                        (-32.0, -64.6),
                        (-32.1, -63.8),
                    ],
                },
            }),
        }
    }

    #[test]
    fn test_default_range_covers_all_bursts() {
        let tasks = TaskExtractor::extract(&burst_product(5), None).unwrap();
        let tags: Vec<&str> = tasks.iter().map(|t| t.tag.as_str()).collect();
        assert_eq!(tags, vec!["01", "02", "03", "04", "05"]);
        assert_eq!(tasks[0].label, "burst_01");
        assert_eq!(tasks[4].label, "burst_05");
    }

    #[test]
    fn test_subrange_keeps_absolute_indices() {
        let tasks =
            TaskExtractor::extract(&burst_product(5), Some(BurstRange::new(2, 3))).unwrap();
        let tags: Vec<&str> = tasks.iter().map(|t| t.tag.as_str()).collect();
        assert_eq!(tags, vec!["02", "03"]);
    }

    #[test]
    fn test_range_past_end_rejected() {
        let err =
            TaskExtractor::extract(&burst_product(5), Some(BurstRange::new(1, 6))).unwrap_err();
        assert!(matches!(err, TopoError::InvalidRange(_)));
        assert!(err.to_string().contains("5 bursts"));
    }

    #[test]
    fn test_zero_start_rejected() {
        let err =
            TaskExtractor::extract(&burst_product(5), Some(BurstRange::new(0, 2))).unwrap_err();
        assert!(matches!(err, TopoError::InvalidRange(_)));
    }

    #[test]
    fn test_empty_product_is_an_error_not_an_empty_list() {
        let err = TaskExtractor::extract(&burst_product(0), None).unwrap_err();
        assert!(matches!(err, TopoError::EmptyResult(_)));
    }

    #[test]
    fn test_prf_falls_back_to_azimuth_interval() {
        let mut product = burst_product(1);
        if let ReaderShape::Bursts(ref mut p) = product.shape {
            p.bursts[0] = burst(None, Some(0.002));
        }
        let tasks = TaskExtractor::extract(&product, None).unwrap();
        assert_eq!(tasks[0].prf, 500.0);
    }

    #[test]
    fn test_missing_prf_and_interval_is_a_metadata_error() {
        let mut product = burst_product(1);
        if let ReaderShape::Bursts(ref mut p) = product.shape {
            p.bursts[0] = burst(None, None);
        }
        let err = TaskExtractor::extract(&product, None).unwrap_err();
        assert!(matches!(err, TopoError::Metadata(_)));
    }

    #[test]
    fn test_right_looking_sensor_fixes_look_side() {
        let tasks = TaskExtractor::extract(&burst_product(2), None).unwrap();
        assert!(tasks.iter().all(|t| t.look_side == LookSide::Right));
    }

    #[test]
    fn test_burst_look_side_from_platform_metadata() {
        let mut product = burst_product(1);
        if let ReaderShape::Bursts(ref mut p) = product.shape {
            p.sensor = SensorKind::Saocom;
        }
        let err = TaskExtractor::extract(&product, None).unwrap_err();
        assert!(matches!(err, TopoError::Metadata(_)));

        if let ReaderShape::Bursts(ref mut p) = product.shape {
            p.look_side = Some(LookSide::Left);
        }
        let tasks = TaskExtractor::extract(&product, None).unwrap();
        assert_eq!(tasks[0].look_side, LookSide::Left);
    }

    #[test]
    fn test_frame_product_yields_single_task() {
        let tasks = TaskExtractor::extract(&frame_product(LookSide::Left), None).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].label, "frame");
        assert_eq!(tasks[0].tag, "frame");
        assert_eq!(tasks[0].look_side, LookSide::Left);
        assert_eq!(tasks[0].polarization, Some(Polarization::HH));
    }

    #[test]
    fn test_burst_range_rejected_for_frames() {
        let err = TaskExtractor::extract(&frame_product(LookSide::Left), Some(BurstRange::new(1, 1)))
            .unwrap_err();
        assert!(matches!(err, TopoError::InvalidRange(_)));
    }
}
