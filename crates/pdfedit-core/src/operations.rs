//! Edit actions, the unit of undo/redo
//!
//! Each variant carries both the old and the new state of whatever it
//! touched, so [`EditAction::apply`] and [`EditAction::revert`] never need to
//! look at anything but the action itself.

use crate::annotations::{
    AnnotationId, AnnotationStore, DocPoint, DrawStroke, ImageAnnotation, PdfRect,
    SignaturePlacement, TextAnnotation, TextEdit,
};
use crate::text_layer::RunKey;

#[derive(Debug, Clone, PartialEq)]
pub enum EditAction {
    /// Text or color change of an extracted run. `None` means "unedited".
    EditText {
        key: RunKey,
        old: Option<TextEdit>,
        new: Option<TextEdit>,
    },
    ResizeText {
        key: RunKey,
        old: Option<TextEdit>,
        new: Option<TextEdit>,
    },
    AddAnnotation {
        annotation: TextAnnotation,
    },
    RemoveAnnotation {
        annotation: TextAnnotation,
        index: usize,
    },
    MoveAnnotation {
        id: AnnotationId,
        from: DocPoint,
        to: DocPoint,
    },
    EditAnnotationText {
        id: AnnotationId,
        old_text: String,
        new_text: String,
    },
    ResizeAnnotationFont {
        id: AnnotationId,
        old_size: f64,
        new_size: f64,
    },
    AddStroke {
        stroke: DrawStroke,
    },
    RemoveStroke {
        stroke: DrawStroke,
        index: usize,
    },
    AddImage {
        image: ImageAnnotation,
    },
    RemoveImage {
        image: ImageAnnotation,
        index: usize,
    },
    MoveImage {
        id: AnnotationId,
        from: DocPoint,
        to: DocPoint,
    },
    ResizeImage {
        id: AnnotationId,
        from: PdfRect,
        to: PdfRect,
    },
    SetSignature {
        old: Option<SignaturePlacement>,
        new: Option<SignaturePlacement>,
    },
}

impl EditAction {
    /// Re-apply the action on a store in its "before" state
    pub fn apply(&self, store: &mut AnnotationStore) {
        match self {
            EditAction::EditText { key, new, .. } | EditAction::ResizeText { key, new, .. } => {
                store.set_text_edit(*key, new.clone());
            }
            EditAction::AddAnnotation { annotation } => {
                store.insert_annotation(usize::MAX, annotation.clone());
            }
            EditAction::RemoveAnnotation { annotation, .. } => {
                store.take_annotation(annotation.id);
            }
            EditAction::MoveAnnotation { id, to, .. } => move_annotation(store, *id, *to),
            EditAction::EditAnnotationText { id, new_text, .. } => {
                if let Some(annotation) = store.annotation_mut(*id) {
                    annotation.text = new_text.clone();
                }
            }
            EditAction::ResizeAnnotationFont { id, new_size, .. } => {
                if let Some(annotation) = store.annotation_mut(*id) {
                    annotation.font_size_pt = *new_size;
                }
            }
            EditAction::AddStroke { stroke } => store.insert_stroke(usize::MAX, stroke.clone()),
            EditAction::RemoveStroke { stroke, .. } => {
                store.take_stroke(stroke.id);
            }
            EditAction::AddImage { image } => store.insert_image(usize::MAX, image.clone()),
            EditAction::RemoveImage { image, .. } => {
                store.take_image(image.id);
            }
            EditAction::MoveImage { id, to, .. } => move_image(store, *id, *to),
            EditAction::ResizeImage { id, to, .. } => {
                if let Some(image) = store.image_mut(*id) {
                    image.set_rect(*to);
                }
            }
            EditAction::SetSignature { new, .. } => store.set_signature(new.clone()),
        }
    }

    /// Undo the action on a store in its "after" state
    pub fn revert(&self, store: &mut AnnotationStore) {
        match self {
            EditAction::EditText { key, old, .. } | EditAction::ResizeText { key, old, .. } => {
                store.set_text_edit(*key, old.clone());
            }
            EditAction::AddAnnotation { annotation } => {
                store.take_annotation(annotation.id);
            }
            EditAction::RemoveAnnotation { annotation, index } => {
                store.insert_annotation(*index, annotation.clone());
            }
            EditAction::MoveAnnotation { id, from, .. } => move_annotation(store, *id, *from),
            EditAction::EditAnnotationText { id, old_text, .. } => {
                if let Some(annotation) = store.annotation_mut(*id) {
                    annotation.text = old_text.clone();
                }
            }
            EditAction::ResizeAnnotationFont { id, old_size, .. } => {
                if let Some(annotation) = store.annotation_mut(*id) {
                    annotation.font_size_pt = *old_size;
                }
            }
            EditAction::AddStroke { stroke } => {
                store.take_stroke(stroke.id);
            }
            EditAction::RemoveStroke { stroke, index } => {
                store.insert_stroke(*index, stroke.clone());
            }
            EditAction::AddImage { image } => {
                store.take_image(image.id);
            }
            EditAction::RemoveImage { image, index } => {
                store.insert_image(*index, image.clone());
            }
            EditAction::MoveImage { id, from, .. } => move_image(store, *id, *from),
            EditAction::ResizeImage { id, from, .. } => {
                if let Some(image) = store.image_mut(*id) {
                    image.set_rect(*from);
                }
            }
            EditAction::SetSignature { old, .. } => store.set_signature(old.clone()),
        }
    }

    /// Variant name, as reported to the host
    pub fn kind(&self) -> &'static str {
        match self {
            EditAction::EditText { .. } => "EditText",
            EditAction::ResizeText { .. } => "ResizeText",
            EditAction::AddAnnotation { .. } => "AddAnnotation",
            EditAction::RemoveAnnotation { .. } => "RemoveAnnotation",
            EditAction::MoveAnnotation { .. } => "MoveAnnotation",
            EditAction::EditAnnotationText { .. } => "EditAnnotationText",
            EditAction::ResizeAnnotationFont { .. } => "ResizeAnnotationFont",
            EditAction::AddStroke { .. } => "AddStroke",
            EditAction::RemoveStroke { .. } => "RemoveStroke",
            EditAction::AddImage { .. } => "AddImage",
            EditAction::RemoveImage { .. } => "RemoveImage",
            EditAction::MoveImage { .. } => "MoveImage",
            EditAction::ResizeImage { .. } => "ResizeImage",
            EditAction::SetSignature { .. } => "SetSignature",
        }
    }

    /// Id of the annotation, stroke or image the action targets
    pub fn annotation_id(&self) -> Option<AnnotationId> {
        match self {
            EditAction::AddAnnotation { annotation }
            | EditAction::RemoveAnnotation { annotation, .. } => Some(annotation.id),
            EditAction::MoveAnnotation { id, .. }
            | EditAction::EditAnnotationText { id, .. }
            | EditAction::ResizeAnnotationFont { id, .. }
            | EditAction::MoveImage { id, .. }
            | EditAction::ResizeImage { id, .. } => Some(*id),
            EditAction::AddStroke { stroke } | EditAction::RemoveStroke { stroke, .. } => {
                Some(stroke.id)
            }
            EditAction::AddImage { image } | EditAction::RemoveImage { image, .. } => {
                Some(image.id)
            }
            EditAction::EditText { .. }
            | EditAction::ResizeText { .. }
            | EditAction::SetSignature { .. } => None,
        }
    }

    /// Page the action lands on, when it can be told from the action alone
    pub fn page_index(&self) -> Option<u32> {
        match self {
            EditAction::EditText { key, .. } | EditAction::ResizeText { key, .. } => {
                Some(key.page_index)
            }
            EditAction::AddAnnotation { annotation }
            | EditAction::RemoveAnnotation { annotation, .. } => Some(annotation.page_index),
            EditAction::AddStroke { stroke } | EditAction::RemoveStroke { stroke, .. } => {
                Some(stroke.page_index)
            }
            EditAction::AddImage { image } | EditAction::RemoveImage { image, .. } => {
                Some(image.page_index)
            }
            EditAction::SetSignature { old, new } => new
                .as_ref()
                .or(old.as_ref())
                .map(|placement| placement.page_index),
            EditAction::MoveAnnotation { .. }
            | EditAction::EditAnnotationText { .. }
            | EditAction::ResizeAnnotationFont { .. }
            | EditAction::MoveImage { .. }
            | EditAction::ResizeImage { .. } => None,
        }
    }
}

fn move_annotation(store: &mut AnnotationStore, id: AnnotationId, to: DocPoint) {
    if let Some(annotation) = store.annotation_mut(id) {
        annotation.doc_x = to.x;
        annotation.doc_y = to.y;
    }
}

fn move_image(store: &mut AnnotationStore, id: AnnotationId, to: DocPoint) {
    if let Some(image) = store.image_mut(id) {
        image.doc_x = to.x;
        image.doc_y = to.y;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::tests::{pixels, sample_layer};
    use crate::annotations::{Color, Focus};
    use pretty_assertions::assert_eq;

    fn annotation_ids(store: &AnnotationStore) -> Vec<AnnotationId> {
        store.annotations().iter().map(|a| a.id).collect()
    }

    #[test]
    fn test_remove_then_revert_restores_position() {
        let mut store = AnnotationStore::new();
        for text in ["a", "b", "c"] {
            store.add_text_annotation(0, 0.0, 0.0, text, 12.0, Color::BLACK);
        }
        let before = store.annotations().to_vec();
        let action = store.remove_annotation(before[1].id).unwrap();
        assert_eq!(annotation_ids(&store), vec![before[0].id, before[2].id]);

        action.revert(&mut store);
        assert_eq!(store.annotations(), &before[..]);

        action.apply(&mut store);
        assert_eq!(annotation_ids(&store), vec![before[0].id, before[2].id]);
    }

    #[test]
    fn test_text_edit_revert_restores_previous_edit() {
        let layer = sample_layer(0);
        let run = &layer.runs()[0];
        let mut store = AnnotationStore::new();
        store.edit_run_text(run, "Bill");
        let second = store.edit_run_text(run, "Receipt").unwrap();

        second.revert(&mut store);
        assert_eq!(store.text_edit_for(run).unwrap().new_text, "Bill");
        second.apply(&mut store);
        assert_eq!(store.text_edit_for(run).unwrap().new_text, "Receipt");
    }

    #[test]
    fn test_revert_is_independent_of_later_state() {
        let mut store = AnnotationStore::new();
        let add = store
            .add_text_annotation(0, 10.0, 10.0, "one", 12.0, Color::BLACK)
            .unwrap();
        let id = add.annotation_id().unwrap();
        let mv = store.move_annotation(id, 50.0, 60.0).unwrap();
        store.move_annotation(id, 90.0, 90.0);

        // Reverting the first move restores its stored origin, not a recomputed one
        mv.revert(&mut store);
        let annotation = store.annotation(id).unwrap();
        assert_eq!((annotation.doc_x, annotation.doc_y), (10.0, 10.0));
    }

    #[test]
    fn test_image_actions_roundtrip() {
        let mut store = AnnotationStore::new();
        let add = store
            .add_image(1, PdfRect::new(0.0, 0.0, 100.0, 50.0), pixels(2, 1))
            .unwrap();
        let id = add.annotation_id().unwrap();
        let resize = store.resize_image(id, 200.0, 0.0, true).unwrap();
        let moved = store.move_image(id, 30.0, 40.0).unwrap();
        assert_eq!(moved.page_index(), None);
        assert_eq!(add.page_index(), Some(1));

        moved.revert(&mut store);
        resize.revert(&mut store);
        assert_eq!(store.image(id).unwrap().rect(), PdfRect::new(0.0, 0.0, 100.0, 50.0));

        store.select(Focus::Image(id));
        add.revert(&mut store);
        assert!(store.images().is_empty());
        assert_eq!(store.focus(), Focus::None);
    }

    #[test]
    fn test_signature_actions() {
        let mut store = AnnotationStore::new();
        let place = store
            .place_signature(2, 0.5, 0.5, 200.0, pixels(5, 2))
            .unwrap();
        let clear = store.clear_signature().unwrap();
        assert_eq!(clear.page_index(), Some(2));
        assert!(store.signature().is_none());

        clear.revert(&mut store);
        assert_eq!(store.signature().unwrap().width_pt, 200.0);
        place.revert(&mut store);
        assert!(store.signature().is_none());
    }

    #[test]
    fn test_kind_names() {
        let mut store = AnnotationStore::new();
        let action = store
            .add_text_annotation(0, 0.0, 0.0, "x", 12.0, Color::BLACK)
            .unwrap();
        assert_eq!(action.kind(), "AddAnnotation");
        let id = action.annotation_id().unwrap();
        assert_eq!(store.remove_annotation(id).unwrap().kind(), "RemoveAnnotation");
    }
}
