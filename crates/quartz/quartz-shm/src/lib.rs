//! Named POSIX shared-memory segments mapped read-write.
//!
//! A segment is identified by a short name (`"frames"` or `"/frames"`); the
//! object lives in the OS shared-memory namespace until [`ShmSegment::unlink`]
//! removes it. Mappings held by other processes stay valid after the unlink,
//! but no new [`ShmSegment::open`] can succeed.

use memmap2::MmapMut;
use std::{
    ffi::CString,
    fs::File,
    io,
    os::fd::FromRawFd,
};
use tracing::debug;

/// Longest object name accepted, including the leading slash.
pub const MAX_NAME_LEN: usize = 255;

/// A named shared-memory object mapped read-write into this process.
pub struct ShmSegment {
    name: String,
    _file: File,
    mmap: MmapMut,
}

impl ShmSegment {
    /// Create the named object (or reuse an existing one), size it to
    /// `size_bytes` and map it read-write.
    ///
    /// An existing object of the same name is truncated first, so the mapping
    /// always starts zero-filled. On failure the name is unlinked again.
    pub fn create(name: &str, size_bytes: u64) -> io::Result<Self> {
        let c_name = object_name(name)?;
        let file = shm_open(&c_name, libc::O_CREAT | libc::O_RDWR)?;

        let mapped = file
            .set_len(0)
            .and_then(|_| file.set_len(size_bytes))
            // SAFETY: the file was just sized; concurrent mutation by other
            // processes is the whole point of the mapping and is handled by
            // the layout stored inside it.
            .and_then(|_| unsafe { MmapMut::map_mut(&file) });

        match mapped {
            Ok(mmap) => {
                debug!(shm = name, size_bytes, "shm: created segment");
                Ok(Self {
                    name: c_name.to_string_lossy().into_owned(),
                    _file: file,
                    mmap,
                })
            }
            Err(e) => {
                let _ = unlink_object(&c_name);
                Err(e)
            }
        }
    }

    /// Open an existing named object and map its full OS-reported size.
    pub fn open(name: &str) -> io::Result<Self> {
        let c_name = object_name(name)?;
        let file = shm_open(&c_name, libc::O_RDWR)?;

        let len = file.metadata()?.len();
        if len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("shared memory segment '{name}' is empty"),
            ));
        }

        // SAFETY: see `create`.
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        debug!(shm = name, len, "shm: opened segment");

        Ok(Self {
            name: c_name.to_string_lossy().into_owned(),
            _file: file,
            mmap,
        })
    }

    /// Remove the named object from the OS namespace. Idempotent: a missing
    /// name is not an error.
    pub fn unlink(name: &str) -> io::Result<()> {
        let c_name = object_name(name)?;
        match unlink_object(&c_name) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    /// Normalized object name, always with a leading `/`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return raw pointer to start of the mapped segment
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.mmap.as_mut_ptr()
    }

    /// Mapped length in bytes; never zero.
    #[inline]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }
}

/// OS page size, falling back to 4 KiB if `sysconf` refuses to answer.
pub fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as usize } else { 4096 }
}

/// Round `bytes` up to the next multiple of the page size.
pub fn round_up_to_page(bytes: u64) -> u64 {
    let page = page_size() as u64;
    bytes.div_ceil(page) * page
}

fn object_name(name: &str) -> io::Result<CString> {
    let trimmed = name.strip_prefix('/').unwrap_or(name);
    if trimmed.is_empty() || trimmed.contains('/') || trimmed.len() + 1 > MAX_NAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid shared memory name '{name}'"),
        ));
    }
    CString::new(format!("/{trimmed}"))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

fn shm_open(name: &CString, oflag: libc::c_int) -> io::Result<File> {
    // SAFETY: `name` is a valid NUL-terminated string for the duration of the call.
    let fd = unsafe { libc::shm_open(name.as_ptr(), oflag, 0o666 as libc::c_uint) };
    if fd == -1 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: `fd` is a freshly opened descriptor that nothing else owns.
    Ok(unsafe { File::from_raw_fd(fd) })
}

fn unlink_object(name: &CString) -> io::Result<()> {
    // SAFETY: `name` is a valid NUL-terminated string for the duration of the call.
    if unsafe { libc::shm_unlink(name.as_ptr()) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
