//! Rewrites `img.src` and `attachmentref.content_path` in a run stream once
//! attachments have been saved to disk, recursing into table cells and
//! section title/body runs.

use dxl_core::ndoc::{AttachmentMeta, AttachmentRefKind, AttachmentType, Run};
use std::collections::HashMap;

/// Resolution maps built from the final, extracted attachment list.
struct ResolutionMaps {
    /// attachmentref name/displayname -> content_path (from `type: "file"` entries only).
    attachmentref_paths: HashMap<String, String>,
    /// img alt/name/stem -> content_path (from `type: "image", ref: picture` entries only).
    image_paths: HashMap<String, String>,
}

fn build_maps(attachments: &[AttachmentMeta], displayname_map: &HashMap<String, String>) -> ResolutionMaps {
    let mut attachmentref_paths = HashMap::new();
    let mut image_paths = HashMap::new();

    for meta in attachments {
        let Some(content_path) = &meta.content_path else {
            continue;
        };

        if meta.kind == AttachmentType::File {
            // Displayname first, then name, per the resolution order readers
            // actually hit (a run is keyed by its displayname when it has one).
            if let Some(displayname) = displayname_map.get(&meta.name) {
                attachmentref_paths.entry(displayname.clone()).or_insert_with(|| content_path.clone());
            }
            attachmentref_paths.entry(meta.name.clone()).or_insert_with(|| content_path.clone());
        }

        if meta.kind == AttachmentType::Image && matches!(meta.reference, AttachmentRefKind::Picture { .. }) {
            image_paths.entry(meta.name.clone()).or_insert_with(|| content_path.clone());
            if let Some(stem) = meta.name.rsplit_once('.').map(|(stem, _)| stem.to_string()) {
                image_paths.entry(stem).or_insert_with(|| content_path.clone());
            }
        }
    }

    ResolutionMaps {
        attachmentref_paths,
        image_paths,
    }
}

/// Walks `runs` in place, filling in `src`/`content_path` wherever a match is
/// found; leaves unresolved references untouched (they keep `None`).
pub fn update_runs_paths(runs: &mut [Run], attachments: &[AttachmentMeta], displayname_map: &HashMap<String, String>) {
    let maps = build_maps(attachments, displayname_map);
    walk(runs, &maps);
}

fn walk(runs: &mut [Run], maps: &ResolutionMaps) {
    for run in runs {
        match run {
            Run::Img { alt, src } => {
                if let Some(path) = maps.image_paths.get(alt.as_str()) {
                    *src = Some(path.clone());
                } else {
                    log::warn!("could not resolve img src for alt '{alt}'");
                }
            }
            Run::AttachmentRef { name, displayname, content_path } => {
                let key = displayname.as_deref().unwrap_or(name.as_str());
                let resolved = maps
                    .attachmentref_paths
                    .get(key)
                    .or_else(|| maps.attachmentref_paths.get(name.as_str()));
                if let Some(path) = resolved {
                    *content_path = Some(path.clone());
                } else {
                    log::error!("could not resolve attachmentref content_path for '{key}' (name '{name}')");
                }
            }
            Run::Table { rows, .. } => {
                for row in rows {
                    for cell in &mut row.cells {
                        walk(&mut cell.runs, maps);
                    }
                }
            }
            Run::Section { title_runs, body_runs, .. } => {
                walk(title_runs, maps);
                walk(body_runs, maps);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxl_core::ndoc::AttachmentRefKind;

    fn file_meta(name: &str, content_path: &str) -> AttachmentMeta {
        AttachmentMeta {
            name: name.to_string(),
            kind: AttachmentType::File,
            reference: AttachmentRefKind::File,
            size: 10,
            created: None,
            modified: None,
            content_path: Some(content_path.to_string()),
            saved_name: None,
            icon_path: None,
            sha256: None,
            extraction_error: None,
        }
    }

    fn image_meta(name: &str, index: usize, content_path: &str) -> AttachmentMeta {
        AttachmentMeta {
            name: name.to_string(),
            kind: AttachmentType::Image,
            reference: AttachmentRefKind::Picture { index },
            size: 10,
            created: None,
            modified: None,
            content_path: Some(content_path.to_string()),
            saved_name: None,
            icon_path: None,
            sha256: None,
            extraction_error: None,
        }
    }

    #[test]
    fn resolves_attachmentref_by_name() {
        let attachments = vec![file_meta("report.pdf", "attachments/report.pdf")];
        let mut runs = vec![Run::AttachmentRef {
            name: "report.pdf".to_string(),
            displayname: None,
            content_path: None,
        }];
        update_runs_paths(&mut runs, &attachments, &HashMap::new());
        assert!(matches!(&runs[0], Run::AttachmentRef { content_path: Some(p), .. } if p == "attachments/report.pdf"));
    }

    #[test]
    fn resolves_attachmentref_by_displayname_when_name_differs() {
        let attachments = vec![file_meta("data.txt", "attachments/report_v1.txt")];
        let mut displayname_map = HashMap::new();
        displayname_map.insert("data.txt".to_string(), "report_v1.txt".to_string());
        let mut runs = vec![Run::AttachmentRef {
            name: "data.txt".to_string(),
            displayname: Some("report_v1.txt".to_string()),
            content_path: None,
        }];
        update_runs_paths(&mut runs, &attachments, &displayname_map);
        assert!(matches!(&runs[0], Run::AttachmentRef { content_path: Some(p), .. } if p == "attachments/report_v1.txt"));
    }

    #[test]
    fn resolves_img_by_alt_stem() {
        let attachments = vec![image_meta("inline_image_0.gif", 0, "attachments/inline_image_0.gif")];
        let mut runs = vec![Run::Img {
            alt: "inline_image_0".to_string(),
            src: None,
        }];
        update_runs_paths(&mut runs, &attachments, &HashMap::new());
        assert!(matches!(&runs[0], Run::Img { src: Some(p), .. } if p == "attachments/inline_image_0.gif"));
    }

    #[test]
    fn recurses_into_table_cells_and_sections() {
        let attachments = vec![file_meta("a.pdf", "attachments/a.pdf")];
        let mut runs = vec![Run::Section {
            title_runs: vec![],
            body_runs: vec![Run::AttachmentRef {
                name: "a.pdf".to_string(),
                displayname: None,
                content_path: None,
            }],
            attributes: None,
        }];
        update_runs_paths(&mut runs, &attachments, &HashMap::new());
        if let Run::Section { body_runs, .. } = &runs[0] {
            assert!(matches!(&body_runs[0], Run::AttachmentRef { content_path: Some(_), .. }));
        } else {
            panic!("expected section");
        }
    }
}
