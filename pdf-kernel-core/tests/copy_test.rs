//! Cross-document copy tests
//!
//! Covers cyclic graphs, shared sub-objects, copy reuse between calls,
//! validation failures that must leave the target untouched, and page
//! merging with inherited attributes.

use pdf_kernel::objects::{Dictionary, Name, Object, PdfString};
use pdf_kernel::{
    CopyOptions, Document, ParseOptions, PdfError, Rectangle, Reference, ResourceCategory, Result,
};
use pretty_assertions::assert_eq;

fn dict(entries: Vec<(&str, Object)>) -> Dictionary {
    entries.into_iter().collect()
}

#[test]
fn test_cycle_is_copied_once() -> Result<()> {
    let mut source = Document::new();
    let a = source.register(Dictionary::new())?;
    let b = source.register(dict(vec![("Next", a.into())]))?;
    source
        .resolve_mut(&a)?
        .as_dict_mut()
        .expect("dictionary")
        .set("Next", b);

    let mut target = Document::new();
    let before = target.registry().len();
    let copied = source.copy_to(&a.into(), &mut target, &CopyOptions::new())?;
    let a2 = copied.as_reference().expect("reference root stays a reference");

    assert_eq!(target.registry().len(), before + 2);
    let b2 = target
        .resolve(&a2)?
        .as_dict()
        .and_then(|d| d.get_reference("Next"))
        .expect("a -> b");
    let back = target
        .resolve(&b2)?
        .as_dict()
        .and_then(|d| d.get_reference("Next"))
        .expect("b -> a");
    assert_eq!(back, a2);
    assert_eq!(a2.owner(), target.id());
    Ok(())
}

#[test]
fn test_shared_object_maps_to_one_target() -> Result<()> {
    let mut source = Document::new();
    let shared = source.register(PdfString::from("shared"))?;
    let root = Object::Dictionary(dict(vec![
        ("First", shared.into()),
        ("Second", Object::Array(vec![Object::from(shared)].into())),
    ]));

    let mut target = Document::new();
    let copied = source.copy_to(&root, &mut target, &CopyOptions::new())?;
    let copied = copied.as_dict().expect("direct root stays direct");

    let first = copied.get_reference("First").expect("first");
    let second = copied
        .get_array("Second")
        .and_then(|array| array.get(0))
        .and_then(Object::as_reference)
        .expect("second");
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn test_repeated_copies_reuse_unless_duplicating() -> Result<()> {
    let mut source = Document::new();
    let font = source.register(dict(vec![("BaseFont", Name::from("Courier").into())]))?;
    let root: Object = font.into();

    let mut target = Document::new();
    let first = source.copy_to(&root, &mut target, &CopyOptions::new())?;
    let again = source.copy_to(&root, &mut target, &CopyOptions::new())?;
    assert_eq!(first, again);

    let duplicated =
        source.copy_to(&root, &mut target, &CopyOptions::new().allow_duplicating(true))?;
    assert_ne!(first, duplicated);
    Ok(())
}

#[test]
fn test_dangling_reference_leaves_target_unchanged() -> Result<()> {
    let mut source = Document::new();
    let gone = source.register(Object::Integer(1))?;
    source.free(&gone)?;
    let kept = source.register(Object::Integer(2))?;
    let root = Object::Dictionary(dict(vec![
        ("Kept", kept.into()),
        ("Gone", gone.into()),
    ]));

    let mut target = Document::new();
    let before: Vec<_> = target.registry().iter_live().collect();
    let result = source.copy_to(&root, &mut target, &CopyOptions::new());

    assert!(matches!(result, Err(PdfError::DanglingReference(_))));
    assert_eq!(target.registry().iter_live().collect::<Vec<_>>(), before);
    Ok(())
}

#[test]
fn test_foreign_root_is_rejected() -> Result<()> {
    let source = Document::new();
    let mut other = Document::new();
    let foreign = other.register(Object::Null)?;

    let mut target = Document::new();
    let result = source.copy_to(&foreign.into(), &mut target, &CopyOptions::new());
    assert!(matches!(result, Err(PdfError::ForeignObject { .. })));
    Ok(())
}

#[test]
fn test_excluded_keys_apply_to_root_only() -> Result<()> {
    let source = Document::new();
    let root = Object::Dictionary(dict(vec![
        ("Parent", Object::Integer(1)),
        ("Child", dict(vec![("Parent", Object::Integer(2))]).into()),
    ]));

    let mut target = Document::new();
    let options = CopyOptions::new().exclude_key("Parent");
    let copied = source.copy_to(&root, &mut target, &options)?;
    let copied = copied.as_dict().expect("dictionary");

    assert!(!copied.contains_key("Parent"));
    assert_eq!(
        copied.get_dict("Child").and_then(|c| c.get_integer("Parent")),
        Some(2)
    );
    Ok(())
}

#[test]
fn test_merge_materializes_inherited_attributes() -> Result<()> {
    let mut source = Document::new();
    let page = source.add_new_page(Rectangle::a4())?;
    let root = source.pages_root()?;
    source
        .resolve_mut(&page)?
        .as_dict_mut()
        .expect("page")
        .remove("MediaBox");
    source
        .resolve_mut(&root)?
        .as_dict_mut()
        .expect("pages")
        .set("Rotate", 90);
    source.add_page_content(&page, b"0 0 m 10 10 l S".to_vec())?;
    let page_box = Rectangle::letter();
    source
        .resolve_mut(&root)?
        .as_dict_mut()
        .expect("pages")
        .set("MediaBox", page_box);

    let mut target = Document::new();
    target.add_new_page(Rectangle::a4())?;
    let copied = target.append_document(&source)?;

    assert_eq!(copied.len(), 1);
    assert_eq!(target.page_count()?, 2);
    assert_eq!(target.page(1)?, copied[0]);

    let page = target.resolve(&copied[0])?.as_dict().expect("page");
    assert_eq!(page.get_integer("Rotate"), Some(90));
    assert_eq!(page.get_reference("Parent"), Some(target.pages_root()?));
    assert_eq!(target.page_media_box(&copied[0])?, Some(page_box));
    assert!(page.get_reference("Contents").is_some());
    Ok(())
}

#[test]
fn test_pages_sharing_objects_stay_shared() -> Result<()> {
    let mut source = Document::new();
    let first = source.add_new_page(Rectangle::a4())?;
    let second = source.add_new_page(Rectangle::a4())?;
    let font = source.register(dict(vec![("BaseFont", Name::from("Times-Roman").into())]))?;
    source.add_resource(&first, ResourceCategory::Font, font)?;
    source.add_resource(&second, ResourceCategory::Font, font)?;

    let mut target = Document::new();
    let copied = target.copy_pages_from(&source, &[1, 0])?;
    let font_of = |page: &Reference| -> Result<_> {
        Ok(target
            .page_resources(page)?
            .get_reference(ResourceCategory::Font, "F1"))
    };
    assert!(font_of(&copied[0])?.is_some());
    assert_eq!(font_of(&copied[0])?, font_of(&copied[1])?);
    Ok(())
}

#[test]
fn test_invalid_page_index_copies_nothing() -> Result<()> {
    let mut source = Document::new();
    source.add_new_page(Rectangle::a4())?;

    let mut target = Document::new();
    let result = target.copy_pages_from(&source, &[0, 3]);
    assert!(matches!(result, Err(PdfError::InvalidPageNumber(3))));
    assert_eq!(target.page_count()?, 0);
    Ok(())
}

#[test]
fn test_merge_of_reloaded_documents() -> Result<()> {
    let mut first = Document::new();
    first.add_new_page(Rectangle::a4())?;
    let mut second = Document::new();
    second.add_new_page(Rectangle::letter())?;
    second.add_new_page(Rectangle::letter())?;

    let first = Document::from_bytes(first.to_bytes()?, ParseOptions::default())?;
    let second = Document::from_bytes(second.to_bytes()?, ParseOptions::default())?;

    let mut merged = Document::new();
    merged.append_document(&first)?;
    merged.append_document(&second)?;
    assert_eq!(merged.page_count()?, 3);

    let reread = Document::from_bytes(merged.to_bytes()?, ParseOptions::strict())?;
    assert_eq!(reread.page_count()?, 3);
    assert_eq!(
        reread.page_media_box(&reread.page(2)?)?,
        Some(Rectangle::letter())
    );
    Ok(())
}

/// A link annotation on `page` whose destination is `destination`.
fn add_link(document: &mut Document, page: &Reference, destination: &Reference) -> Result<Reference> {
    let link = document.register(dict(vec![
        ("Type", Name::from("Annot").into()),
        ("Subtype", Name::from("Link").into()),
        ("Rect", Object::from(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(100),
            Object::Integer(20),
        ])),
        ("P", (*page).into()),
        (
            "Dest",
            Object::from(vec![
                Object::Reference(*destination),
                Object::Name(Name::from("Fit")),
            ]),
        ),
    ]))?;
    document
        .resolve_mut(page)?
        .as_dict_mut()
        .expect("page")
        .set("Annots", Object::from(vec![Object::Reference(link)]));
    Ok(link)
}

#[test]
fn test_page_copy_leaves_other_pages_behind() -> Result<()> {
    let mut source = Document::new();
    let mut pages = Vec::new();
    for _ in 0..50 {
        pages.push(source.add_new_page(Rectangle::a4())?);
    }
    add_link(&mut source, &pages[0], &pages[49])?;
    let bead = source.register(dict(vec![("P", pages[0].into())]))?;
    {
        let page = source.resolve_mut(&pages[0])?.as_dict_mut().expect("page");
        page.set("StructParents", 3);
        page.set("B", Object::from(vec![Object::Reference(bead)]));
    }

    let mut target = Document::new();
    let before = target.registry().len();
    let copied = target.copy_pages_from(&source, &[0])?;

    // The page and its link annotation, nothing from the rest of the tree
    assert_eq!(target.registry().len(), before + 2);
    assert_eq!(target.page_count()?, 1);

    let page = target.resolve(&copied[0])?.as_dict().expect("page");
    assert!(!page.contains_key("StructParents"));
    assert!(!page.contains_key("B"));
    let link = page
        .get_array("Annots")
        .and_then(|annots| annots.get(0))
        .and_then(Object::as_reference)
        .expect("copied annotation");

    let link = target.resolve(&link)?.as_dict().expect("annotation");
    assert_eq!(link.get_reference("P"), Some(copied[0]));
    let dest = link.get_array("Dest").expect("destination");
    assert_eq!(dest.get(0), Some(&Object::Null));
    assert_eq!(dest.get(1), Some(&Object::Name(Name::from("Fit"))));
    Ok(())
}

#[test]
fn test_links_between_copied_pages_follow_the_copies() -> Result<()> {
    let mut source = Document::new();
    let first = source.add_new_page(Rectangle::a4())?;
    let second = source.add_new_page(Rectangle::a4())?;
    add_link(&mut source, &first, &second)?;
    add_link(&mut source, &second, &first)?;

    let mut target = Document::new();
    let before = target.registry().len();
    let copied = target.copy_pages_from(&source, &[0, 1])?;
    assert_eq!(target.registry().len(), before + 4);

    let destination_of = |page: &Reference| -> Result<Option<Reference>> {
        let annots = target
            .resolve(page)?
            .as_dict()
            .and_then(|dict| dict.get_array("Annots"))
            .expect("annotations");
        let link = annots.get(0).and_then(Object::as_reference).expect("link");
        Ok(target
            .resolve(&link)?
            .as_dict()
            .and_then(|dict| dict.get_array("Dest"))
            .and_then(|dest| dest.get(0))
            .and_then(Object::as_reference))
    };
    assert_eq!(destination_of(&copied[0])?, Some(copied[1]));
    assert_eq!(destination_of(&copied[1])?, Some(copied[0]));
    Ok(())
}

#[test]
fn test_page_listed_twice_is_copied_twice() -> Result<()> {
    let mut source = Document::new();
    let page = source.add_new_page(Rectangle::a4())?;
    source.add_page_content(&page, b"0 0 m 5 5 l S".to_vec())?;

    let mut target = Document::new();
    let copied = target.copy_pages_from(&source, &[0, 0])?;
    assert_eq!(copied.len(), 2);
    assert_ne!(copied[0], copied[1]);
    assert_eq!(target.pages()?, copied);

    // Both copies draw from the one copied content stream
    let contents = |page: &Reference| -> Result<Option<Reference>> {
        Ok(target
            .resolve(page)?
            .as_dict()
            .and_then(|dict| dict.get_reference("Contents")))
    };
    assert!(contents(&copied[0])?.is_some());
    assert_eq!(contents(&copied[0])?, contents(&copied[1])?);
    Ok(())
}
