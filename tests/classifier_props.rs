use proptest::prelude::*;

use picpaste::clipboard::{classify_formats, is_memory_image, ClipboardFormat, MemoryClipboard};

fn image_format() -> impl Strategy<Value = ClipboardFormat> {
    prop_oneof![
        Just(ClipboardFormat::Png),
        Just(ClipboardFormat::Dib),
        Just(ClipboardFormat::Bitmap),
    ]
}

fn any_format() -> impl Strategy<Value = ClipboardFormat> {
    prop_oneof![
        Just(ClipboardFormat::FileDrop),
        Just(ClipboardFormat::FileName),
        Just(ClipboardFormat::FileNameW),
        Just(ClipboardFormat::ShellIdList),
        image_format(),
        "[A-Za-z ]{1,12}".prop_map(|name| ClipboardFormat::from_registered_name(&name)),
    ]
}

proptest! {
    #[test]
    fn file_drop_is_never_a_memory_image(
        mut formats in prop::collection::vec(any_format(), 0..8),
        position in 0usize..8,
    ) {
        let at = position.min(formats.len());
        formats.insert(at, ClipboardFormat::FileDrop);
        prop_assert!(!classify_formats(&formats));
    }

    #[test]
    fn pure_image_formats_are_always_memory_images(
        formats in prop::collection::vec(image_format(), 1..6),
    ) {
        prop_assert!(classify_formats(&formats));
    }

    #[test]
    fn live_clipboard_matches_pure_classification(
        formats in prop::collection::vec(any_format(), 0..6),
    ) {
        let mut clipboard = MemoryClipboard::new();
        for format in &formats {
            clipboard.put(format.clone(), vec![0]);
        }
        prop_assert_eq!(is_memory_image(&mut clipboard), classify_formats(&formats));

        clipboard.fail_enumeration(true);
        prop_assert!(is_memory_image(&mut clipboard));
    }
}
