//! Maps raw `notify` events onto pipeline actions.

use std::path::PathBuf;

use notify::Event;
use notify::event::{AccessKind, AccessMode, EventKind, ModifyKind, RenameMode};

use crate::gc::is_root_entry;
use crate::layout::{GC_SENTINEL, PreviewLayout, REGENERATE_SENTINEL};
use crate::media::{classify, file_name};

/// What the control loop should do for one changed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchAction {
    /// Original created or written: (re)generate its previews.
    Process(PathBuf),
    /// Original removed or renamed away: drop its previews.
    RemovePreviews(PathBuf),
    /// GC sentinel appeared.
    CollectGarbage(PathBuf),
    /// Regeneration sentinel appeared.
    Regenerate(PathBuf),
    /// The OS dropped events; state must be re-derived from disk.
    Rescan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Created,
    Written,
    Removed,
}

pub fn route_event(layout: &PreviewLayout, event: &Event) -> Vec<WatchAction> {
    if event.need_rescan() {
        return vec![WatchAction::Rescan];
    }

    changes(event)
        .into_iter()
        .filter_map(|(path, change)| route_change(layout, path, change))
        .collect()
}

fn changes(event: &Event) -> Vec<(PathBuf, Change)> {
    let each = |change: Change| {
        event
            .paths
            .iter()
            .map(|path| (path.clone(), change))
            .collect::<Vec<_>>()
    };

    match &event.kind {
        EventKind::Create(_) => each(Change::Created),
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => each(Change::Written),
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => each(Change::Written),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => each(Change::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => each(Change::Created),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut out = Vec::with_capacity(2);
            let mut paths = event.paths.iter();
            if let Some(from) = paths.next() {
                out.push((from.clone(), Change::Removed));
            }
            if let Some(to) = paths.next() {
                out.push((to.clone(), Change::Created));
            }
            out
        }
        // Backends that cannot tell the two rename halves apart.
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|path| {
                let change = if path.exists() {
                    Change::Created
                } else {
                    Change::Removed
                };
                (path.clone(), change)
            })
            .collect(),
        EventKind::Remove(_) => each(Change::Removed),
        _ => Vec::new(),
    }
}

fn route_change(layout: &PreviewLayout, path: PathBuf, change: Change) -> Option<WatchAction> {
    // Our own writes into size directories must never feed back into the loop.
    if layout.size_for_path(&path).is_some() || !is_root_entry(layout, &path) {
        return None;
    }

    let name = file_name(&path)?;
    if name == GC_SENTINEL {
        return (change == Change::Created).then_some(WatchAction::CollectGarbage(path));
    }
    if name == REGENERATE_SENTINEL {
        return (change == Change::Created).then_some(WatchAction::Regenerate(path));
    }
    if !classify(name).is_supported() {
        return None;
    }

    match change {
        Change::Created | Change::Written => Some(WatchAction::Process(path)),
        Change::Removed => Some(WatchAction::RemovePreviews(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::PreviewSize;
    use notify::event::{CreateKind, DataChange, Flag, MetadataKind, RemoveKind};

    fn layout() -> PreviewLayout {
        PreviewLayout::new("/up", PreviewSize::defaults())
    }

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |ev, p| ev.add_path(PathBuf::from(p)))
    }

    #[test]
    fn create_and_write_process_the_original() {
        let layout = layout();
        let created = event(EventKind::Create(CreateKind::File), &["/up/photo.png"]);
        assert_eq!(
            route_event(&layout, &created),
            vec![WatchAction::Process("/up/photo.png".into())]
        );

        let written = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/up/clip.mp4"],
        );
        assert_eq!(
            route_event(&layout, &written),
            vec![WatchAction::Process("/up/clip.mp4".into())]
        );

        let closed = event(
            EventKind::Access(AccessKind::Close(AccessMode::Write)),
            &["/up/clip.mp4"],
        );
        assert_eq!(route_event(&layout, &closed).len(), 1);
    }

    #[test]
    fn metadata_changes_are_ignored() {
        let chmod = event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            &["/up/photo.png"],
        );
        assert!(route_event(&layout(), &chmod).is_empty());
    }

    #[test]
    fn size_directory_writes_never_loop_back() {
        let layout = layout();
        for path in ["/up/320x200/photo.jpg", "/up/800x600", "/up/640x400/.photo.jpg.x.tmp"] {
            let ev = event(EventKind::Create(CreateKind::Any), &[path]);
            assert!(route_event(&layout, &ev).is_empty(), "{path}");
        }
    }

    #[test]
    fn removal_and_rename_drop_previews() {
        let layout = layout();
        let removed = event(EventKind::Remove(RemoveKind::File), &["/up/a.heic"]);
        assert_eq!(
            route_event(&layout, &removed),
            vec![WatchAction::RemovePreviews("/up/a.heic".into())]
        );

        let renamed = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/up/old.png", "/up/new.png"],
        );
        assert_eq!(
            route_event(&layout, &renamed),
            vec![
                WatchAction::RemovePreviews("/up/old.png".into()),
                WatchAction::Process("/up/new.png".into()),
            ]
        );

        let moved_out = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            &["/up/old.png"],
        );
        assert_eq!(
            route_event(&layout, &moved_out),
            vec![WatchAction::RemovePreviews("/up/old.png".into())]
        );
    }

    #[test]
    fn sentinels_only_react_to_creation() {
        let layout = layout();
        let gc = event(EventKind::Create(CreateKind::File), &["/up/.trigger_gc"]);
        assert_eq!(
            route_event(&layout, &gc),
            vec![WatchAction::CollectGarbage("/up/.trigger_gc".into())]
        );

        let regen = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::To)),
            &["/up/.trigger_regenerate"],
        );
        assert_eq!(
            route_event(&layout, &regen),
            vec![WatchAction::Regenerate("/up/.trigger_regenerate".into())]
        );

        let gc_written = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Any)),
            &["/up/.trigger_gc"],
        );
        assert!(route_event(&layout, &gc_written).is_empty());

        let gc_removed = event(EventKind::Remove(RemoveKind::File), &["/up/.trigger_gc"]);
        assert!(route_event(&layout, &gc_removed).is_empty());
    }

    #[test]
    fn hidden_and_unsupported_files_are_ignored() {
        let layout = layout();
        for path in ["/up/.photo.png.swp", "/up/readme.txt", "/up/.DS_Store"] {
            let ev = event(EventKind::Create(CreateKind::File), &[path]);
            assert!(route_event(&layout, &ev).is_empty(), "{path}");
            let ev = event(EventKind::Remove(RemoveKind::File), &[path]);
            assert!(route_event(&layout, &ev).is_empty(), "{path}");
        }
    }

    #[test]
    fn overflow_requests_rescan() {
        let ev = Event::new(EventKind::Other).set_flag(Flag::Rescan);
        assert_eq!(route_event(&layout(), &ev), vec![WatchAction::Rescan]);
    }

    #[test]
    fn the_root_itself_is_not_an_original() {
        let ev = event(EventKind::Remove(RemoveKind::Folder), &["/up"]);
        assert!(route_event(&layout(), &ev).is_empty());
    }
}
