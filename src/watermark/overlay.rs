//! Stamp the first page of a watermark PDF onto every page of a document.
//!
//! The watermark page becomes a Form XObject inside the target document.
//! Each page's existing content is wrapped in `q ... Q` so its graphics
//! state cannot leak into the overlay, then the form is drawn on top.

use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

use super::WatermarkError;

const WATERMARK_NAME: &str = "QmWm";
const FOOTER_FONT: &str = "QmF1";
const FOOTER_SIZE: i64 = 8;
const FOOTER_X: i64 = 20;
const FOOTER_Y: i64 = 12;
const DEFAULT_MEDIA_BOX: [i64; 4] = [0, 0, 612, 792];

/// Guard against cyclic `/Parent` chains.
const MAX_TREE_DEPTH: usize = 32;

/// A loaded watermark, reusable across many target documents.
#[derive(Debug, Clone)]
pub struct Stamp {
    source: Document,
}

impl Stamp {
    pub fn load(path: &Path) -> Result<Self, WatermarkError> {
        Self::from_document(Document::load(path)?, &path.display().to_string())
    }

    pub fn load_mem(bytes: &[u8]) -> Result<Self, WatermarkError> {
        Self::from_document(Document::load_mem(bytes)?, "<memory>")
    }

    fn from_document(source: Document, origin: &str) -> Result<Self, WatermarkError> {
        if source.get_pages().is_empty() {
            return Err(WatermarkError::NoPages(origin.to_string()));
        }
        Ok(Self { source })
    }

    /// Overlay the watermark (and the optional footer line) on every page
    /// of `doc`. Returns the number of pages stamped.
    pub fn apply(&self, doc: &mut Document, footer: Option<&str>) -> Result<usize, WatermarkError> {
        let form_id = self.import_form(doc)?;
        let font_id = footer.map(|_| {
            doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Helvetica",
            })
        });

        let opening = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
        let closing = doc.add_object(Stream::new(dictionary! {}, overlay_content(footer)?));

        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        for &page_id in &pages {
            let mut resources = inherited_resources(doc, page_id)?;
            add_resource(doc, &mut resources, b"XObject", WATERMARK_NAME, form_id)?;
            if let Some(font_id) = font_id {
                add_resource(doc, &mut resources, b"Font", FOOTER_FONT, font_id)?;
            }

            let mut contents = vec![Object::Reference(opening)];
            contents.extend(page_contents(doc, page_id)?);
            contents.push(Object::Reference(closing));

            let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
            page.set("Resources", resources);
            page.set("Contents", contents);
        }

        // the watermark's own page tree came along with its objects
        doc.prune_objects();
        Ok(pages.len())
    }

    /// Copy the watermark's objects into `doc` and wrap its first page in
    /// a Form XObject.
    fn import_form(&self, doc: &mut Document) -> Result<ObjectId, WatermarkError> {
        let mut source = self.source.clone();
        source.renumber_objects_with(doc.max_id + 1);

        let page_id = source
            .get_pages()
            .into_values()
            .next()
            .ok_or_else(|| WatermarkError::NoPages("watermark".into()))?;
        let content = source.get_page_content(page_id)?;
        let resources = inherited_resources(&source, page_id)?;
        let bbox = media_box(&source, page_id)?;

        let last_id = source
            .objects
            .keys()
            .map(|(id, _)| *id)
            .max()
            .unwrap_or(doc.max_id);
        doc.objects.extend(source.objects);
        doc.max_id = doc.max_id.max(last_id);

        let form = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => bbox,
                "Resources" => resources,
            },
            content,
        );
        Ok(doc.add_object(form))
    }
}

fn overlay_content(footer: Option<&str>) -> Result<Vec<u8>, WatermarkError> {
    let mut operations = vec![
        Operation::new("Q", vec![]),
        Operation::new("q", vec![]),
        Operation::new("Do", vec![Object::Name(WATERMARK_NAME.into())]),
        Operation::new("Q", vec![]),
    ];

    if let Some(text) = footer {
        operations.extend([
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![Object::Name(FOOTER_FONT.into()), Object::Integer(FOOTER_SIZE)],
            ),
            Operation::new(
                "Td",
                vec![Object::Integer(FOOTER_X), Object::Integer(FOOTER_Y)],
            ),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ]);
    }

    Ok(Content { operations }.encode()?)
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Result<&'a Object, WatermarkError> {
    match object {
        Object::Reference(id) => Ok(doc.get_object(*id)?),
        other => Ok(other),
    }
}

/// Look up `key` on the page, then up its `/Parent` chain.
fn inherited<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Result<Option<&'a Object>, WatermarkError> {
    let mut node = doc.get_dictionary(page_id)?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return Ok(Some(resolve(doc, value)?));
        }
        match node.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent) => node = doc.get_dictionary(parent)?,
            Err(_) => break,
        }
    }
    Ok(None)
}

fn inherited_resources(doc: &Document, page_id: ObjectId) -> Result<Dictionary, WatermarkError> {
    match inherited(doc, page_id, b"Resources")? {
        Some(resources) => Ok(resources.as_dict()?.clone()),
        None => Ok(Dictionary::new()),
    }
}

fn media_box(doc: &Document, page_id: ObjectId) -> Result<Object, WatermarkError> {
    match inherited(doc, page_id, b"MediaBox")? {
        Some(media_box) => Ok(media_box.clone()),
        None => Ok(DEFAULT_MEDIA_BOX
            .iter()
            .map(|v| Object::Integer(*v))
            .collect::<Vec<_>>()
            .into()),
    }
}

fn add_resource(
    doc: &Document,
    resources: &mut Dictionary,
    category: &[u8],
    name: &str,
    id: ObjectId,
) -> Result<(), WatermarkError> {
    let mut entries = match resources.get(category) {
        Ok(existing) => resolve(doc, existing)?.as_dict()?.clone(),
        Err(_) => Dictionary::new(),
    };
    entries.set(name, Object::Reference(id));
    resources.set(category, entries);
    Ok(())
}

/// The page's content stream references, flattened to a list.
fn page_contents(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>, WatermarkError> {
    let page = doc.get_dictionary(page_id)?;
    let contents = match page.get(b"Contents") {
        Ok(contents) => contents,
        Err(_) => return Ok(Vec::new()),
    };

    match contents {
        Object::Reference(id) => match doc.get_object(*id)? {
            Object::Array(items) => Ok(items.clone()),
            _ => Ok(vec![Object::Reference(*id)]),
        },
        Object::Array(items) => Ok(items.clone()),
        _ => Ok(Vec::new()),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use lopdf::{dictionary, Document, Object, Stream};

    /// A PDF with `pages` pages of `width` x `height`, each drawing `content`.
    pub fn pdf(pages: usize, width: i64, height: i64, content: &str) -> Vec<u8> {
        let mut doc = Document::with_version("1.4");
        let pages_id = doc.new_object_id();

        let kids: Vec<Object> = (0..pages)
            .map(|_| {
                let content_id =
                    doc.add_object(Stream::new(dictionary! {}, content.as_bytes().to_vec()));
                let page_id = doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
                    "Contents" => content_id,
                });
                Object::Reference(page_id)
            })
            .collect();

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages as i64,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }
}
