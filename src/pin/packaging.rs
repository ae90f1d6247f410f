use super::model::OutgoingFile;

const MIB: u64 = 1024 * 1024;

/// Largest upload one message may carry in a guild of the given boost tier.
pub fn upload_ceiling(premium_tier: u8) -> u64 {
    match premium_tier {
        0 | 1 => 25 * MIB,
        2 => 50 * MIB,
        _ => 100 * MIB,
    }
}

/// Attachments split into postable groups. Every file group fits under the ceiling
/// and the per-message file limit. Every link group respects the link limit.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PackedAttachments {
    pub file_groups: Vec<Vec<OutgoingFile>>,
    pub link_groups: Vec<Vec<String>>,
}

impl PackedAttachments {
    pub fn is_empty(&self) -> bool {
        self.file_groups.is_empty() && self.link_groups.is_empty()
    }
}

/// Greedy packer. Files are kept in order and a new group starts as soon as the next
/// file would push the running size over the ceiling or the group is full.
#[derive(Debug)]
pub struct AttachmentPacker {
    ceiling: u64,
    max_files: usize,
    max_links: usize,
    packed: PackedAttachments,
    group_size: u64,
}

impl AttachmentPacker {
    pub fn new(ceiling: u64, max_files: usize, max_links: usize) -> Self {
        Self {
            ceiling,
            max_files: max_files.max(1),
            max_links: max_links.max(1),
            packed: PackedAttachments::default(),
            group_size: 0,
        }
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    /// Files above the ceiling can only be sent as links.
    pub fn fits(&self, size: u64) -> bool {
        size <= self.ceiling
    }

    /// Callers must check `fits` first; an oversized file still gets a group of its own.
    pub fn push_file(&mut self, file: OutgoingFile) {
        let size = file.size();
        let start_new = match self.packed.file_groups.last() {
            None => true,
            Some(group) => {
                group.len() >= self.max_files || self.group_size.saturating_add(size) > self.ceiling
            }
        };

        if start_new {
            self.packed.file_groups.push(Vec::new());
            self.group_size = 0;
        }

        self.group_size += size;
        if let Some(group) = self.packed.file_groups.last_mut() {
            group.push(file);
        }
    }

    pub fn push_link(&mut self, link: String) {
        match self.packed.link_groups.last_mut() {
            Some(group) if group.len() < self.max_links => group.push(link),
            _ => self.packed.link_groups.push(vec![link]),
        }
    }

    pub fn finish(self) -> PackedAttachments {
        self.packed
    }
}
