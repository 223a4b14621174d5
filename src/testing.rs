//! In-memory collaborators for unit tests
//!
//! A paged user address space with lazy descriptors and stack growth, a
//! flat in-memory filesystem, a scripted console and a process that records
//! what the syscall layer asked of it.

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, VecDeque};
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::alloc::{GlobalAlloc, Layout};
use core::cell::Cell;
use std::alloc::System;

use spin::Mutex;

use crate::fs::{Console, FileSystem};
use crate::mm::{AddressSpace, PageDescriptor, PageFlags, PageSource, VirtAddr, PAGE_SIZE, PHYS_BASE};
use crate::process::{Pid, Process};
use crate::syscall::Syscalls;
use crate::trap::{TrapFrame, WORD_SIZE};

/// Where test buffers and strings are placed.
pub const DATA_BASE: usize = 0x0804_8000;

/// Top of the user stack.
pub const STACK_TOP: usize = PHYS_BASE;

/// Stack pointer used for every trapped call.
pub const USER_ESP: usize = STACK_TOP - 0x100;

pub type TestSyscalls = Syscalls<MemFs, ScriptedConsole>;

pub fn syscalls() -> TestSyscalls {
    Syscalls::new(MemFs::default(), ScriptedConsole::default())
}

/// System allocator that remembers the largest request made on each thread.
struct TrackingAlloc;

std::thread_local! {
    static LARGEST_ALLOC: Cell<usize> = const { Cell::new(0) };
}

unsafe impl GlobalAlloc for TrackingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let _ = LARGEST_ALLOC.try_with(|largest| largest.set(largest.get().max(layout.size())));
        unsafe { System.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) }
    }
}

#[global_allocator]
static ALLOCATOR: TrackingAlloc = TrackingAlloc;

/// Run `f` and report the largest single allocation it made on this thread.
pub fn largest_allocation<R>(f: impl FnOnce() -> R) -> (R, usize) {
    LARGEST_ALLOC.with(|largest| largest.set(0));
    let result = f();
    (result, LARGEST_ALLOC.with(Cell::get))
}

/// A sparse user address space.
#[derive(Default)]
pub struct MockSpace {
    pages: BTreeMap<usize, (PageFlags, Box<[u8; PAGE_SIZE]>)>,
    lazy: BTreeMap<usize, PageDescriptor>,
    pub loads: usize,
    pub stack_grows: usize,
    pub fail_loads: bool,
}

impl MockSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map zeroed pages covering `[addr, addr + len)`.
    pub fn map(&mut self, addr: VirtAddr, len: usize, writable: bool) {
        let mut flags = PageFlags::PRESENT | PageFlags::USER;
        if writable {
            flags |= PageFlags::WRITABLE;
        }
        self.map_flags(addr, len, flags);
    }

    /// Map zeroed pages covering `[addr, addr + len)` with exactly `flags`.
    pub fn map_flags(&mut self, addr: VirtAddr, len: usize, flags: PageFlags) {
        let first = addr.page_number();
        let last = (addr.as_usize() + len.max(1) - 1) >> crate::mm::address::PAGE_SHIFT;
        for page in first..=last {
            self.pages
                .entry(page)
                .or_insert_with(|| (flags, Box::new([0u8; PAGE_SIZE])))
                .0 = flags;
        }
    }

    /// Register a lazy descriptor for the page at `upage`.
    pub fn add_lazy(&mut self, upage: VirtAddr, source: PageSource, writable: bool) {
        let desc = PageDescriptor {
            upage: upage.page_base(),
            source,
            writable,
            loaded: false,
        };
        self.lazy.insert(upage.page_number(), desc);
    }

    /// Write bytes into mapped pages, ignoring permissions.
    pub fn poke(&mut self, addr: VirtAddr, bytes: &[u8]) {
        for (i, &byte) in bytes.iter().enumerate() {
            let at = VirtAddr::new(addr.as_usize() + i);
            let (_, data) = self
                .pages
                .get_mut(&at.page_number())
                .expect("poke into unmapped page");
            data[at.page_offset()] = byte;
        }
    }

    /// Read bytes from mapped pages.
    pub fn peek(&self, addr: VirtAddr, len: usize) -> Vec<u8> {
        let mut out = alloc::vec![0u8; len];
        self.copy_in(addr, &mut out);
        out
    }
}

impl AddressSpace for MockSpace {
    fn page_flags(&self, addr: VirtAddr) -> Option<PageFlags> {
        self.pages.get(&addr.page_number()).map(|(flags, _)| *flags)
    }

    fn lookup_lazy_descriptor(&self, upage: VirtAddr) -> Option<PageDescriptor> {
        self.lazy.get(&upage.page_number()).copied()
    }

    fn load(&mut self, desc: &PageDescriptor) -> bool {
        if self.fail_loads {
            return false;
        }
        self.loads += 1;
        self.map(desc.upage, PAGE_SIZE, desc.writable);
        if let Some(entry) = self.lazy.get_mut(&desc.upage.page_number()) {
            entry.loaded = true;
        }
        true
    }

    fn grow_stack(&mut self, addr: VirtAddr) -> bool {
        self.stack_grows += 1;
        self.map(addr.page_base(), PAGE_SIZE, true);
        true
    }

    fn copy_in(&self, src: VirtAddr, dst: &mut [u8]) {
        for (i, byte) in dst.iter_mut().enumerate() {
            let at = VirtAddr::new(src.as_usize() + i);
            let (_, data) = self
                .pages
                .get(&at.page_number())
                .expect("copy_in from a page the validator did not resolve");
            *byte = data[at.page_offset()];
        }
    }

    fn copy_out(&mut self, dst: VirtAddr, src: &[u8]) {
        for (i, &byte) in src.iter().enumerate() {
            let at = VirtAddr::new(dst.as_usize() + i);
            let (flags, data) = self
                .pages
                .get_mut(&at.page_number())
                .expect("copy_out to a page the validator did not resolve");
            assert!(flags.contains(PageFlags::WRITABLE), "copy_out to read-only page");
            data[at.page_offset()] = byte;
        }
    }
}

/// A flat filesystem whose files grow on write.
#[derive(Default)]
pub struct MemFs {
    files: BTreeMap<String, Arc<Mutex<Vec<u8>>>>,
    /// Files never grow beyond this many bytes, if set.
    pub size_limit: Option<usize>,
    /// Length reported for every file instead of its real size, if set.
    pub length_override: Option<u32>,
    pub open_handles: usize,
}

pub struct MemFile {
    data: Arc<Mutex<Vec<u8>>>,
    pos: usize,
}

impl MemFs {
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.files.get(path).map(|data| data.lock().clone())
    }
}

impl FileSystem for MemFs {
    type File = MemFile;

    fn create(&mut self, path: &str, size: u32) -> bool {
        if path.is_empty() || self.files.contains_key(path) {
            return false;
        }
        let data = alloc::vec![0u8; size as usize];
        self.files.insert(path.to_string(), Arc::new(Mutex::new(data)));
        true
    }

    fn remove(&mut self, path: &str) -> bool {
        self.files.remove(path).is_some()
    }

    fn open(&mut self, path: &str) -> Option<MemFile> {
        let data = self.files.get(path)?.clone();
        self.open_handles += 1;
        Some(MemFile { data, pos: 0 })
    }

    fn read(&mut self, file: &mut MemFile, buf: &mut [u8]) -> usize {
        let data = file.data.lock();
        let start = file.pos.min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        file.pos += n;
        n
    }

    fn write(&mut self, file: &mut MemFile, buf: &[u8]) -> usize {
        let mut data = file.data.lock();
        let end = match self.size_limit {
            Some(limit) => (file.pos + buf.len()).min(limit.max(file.pos)),
            None => file.pos + buf.len(),
        };
        let n = end - file.pos;
        if data.len() < end {
            data.resize(end, 0);
        }
        data[file.pos..end].copy_from_slice(&buf[..n]);
        file.pos = end;
        n
    }

    fn seek(&mut self, file: &mut MemFile, pos: u32) {
        file.pos = pos as usize;
    }

    fn tell(&self, file: &MemFile) -> u32 {
        file.pos as u32
    }

    fn length(&self, file: &MemFile) -> u32 {
        self.length_override
            .unwrap_or_else(|| file.data.lock().len() as u32)
    }

    fn close(&mut self, file: MemFile) {
        drop(file);
        self.open_handles -= 1;
    }
}

/// A console with canned keyboard input that records everything written.
#[derive(Default)]
pub struct ScriptedConsole {
    pub input: VecDeque<u8>,
    pub output: Vec<u8>,
    pub putbufs: usize,
}

impl Console for ScriptedConsole {
    fn putbuf(&mut self, buf: &[u8]) {
        self.output.extend_from_slice(buf);
        self.putbufs += 1;
    }

    fn getc(&mut self) -> Option<u8> {
        self.input.pop_front()
    }
}

/// A process that records what the syscall layer asked of it.
pub struct MockProcess {
    pid: Pid,
    name: String,
    pub space: MockSpace,
    pub exit_status: Option<i32>,
    pub powered_off: bool,
    /// Unreaped children and the status each will report.
    pub children: BTreeMap<Pid, i32>,
    pub execs: Vec<String>,
    next_child: i32,
    data_next: usize,
}

impl MockProcess {
    pub fn new(pid: i32, name: &str) -> Self {
        let mut space = MockSpace::new();
        space.map(VirtAddr::new(STACK_TOP - PAGE_SIZE), PAGE_SIZE, true);
        Self {
            pid: Pid::from_raw(pid),
            name: name.to_string(),
            space,
            exit_status: None,
            powered_off: false,
            children: BTreeMap::new(),
            execs: Vec::new(),
            next_child: pid * 100,
            data_next: DATA_BASE,
        }
    }

    /// Reserve `len` bytes of mapped, writable user memory.
    pub fn alloc(&mut self, len: usize) -> u32 {
        let addr = self.data_next;
        self.space.map(VirtAddr::new(addr), len, true);
        self.data_next += (len + 15) & !15;
        addr as u32
    }

    /// Place `bytes` in user memory.
    pub fn bytes(&mut self, bytes: &[u8]) -> u32 {
        let addr = self.alloc(bytes.len().max(1));
        self.space.poke(VirtAddr::from(addr), bytes);
        addr
    }

    /// Place a NUL-terminated copy of `s` in user memory.
    pub fn string(&mut self, s: &str) -> u32 {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        self.bytes(&bytes)
    }

    /// Push a call number and its arguments and build the trap frame.
    pub fn call(&mut self, words: &[u32]) -> TrapFrame {
        self.call_at(USER_ESP, words)
    }

    /// Like [`MockProcess::call`], with the words placed at `esp`.
    pub fn call_at(&mut self, esp: usize, words: &[u32]) -> TrapFrame {
        for (slot, word) in words.iter().enumerate() {
            let at = VirtAddr::new(esp + slot * WORD_SIZE);
            self.space.poke(at, &word.to_le_bytes());
        }
        TrapFrame::syscall(esp as u32)
    }

    /// Add a child that will report `status` when waited for.
    pub fn add_child(&mut self, child: i32, status: i32) {
        self.children.insert(Pid::from_raw(child), status);
    }
}

impl Process for MockProcess {
    type Space = MockSpace;

    fn pid(&self) -> Pid {
        self.pid
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn address_space(&mut self) -> &mut MockSpace {
        &mut self.space
    }

    fn exec(&mut self, cmdline: &str) -> Option<Pid> {
        self.execs.push(cmdline.to_string());
        if cmdline.starts_with("no-such-program") {
            return None;
        }
        let child = Pid::from_raw(self.next_child);
        self.next_child += 1;
        self.children.insert(child, 0);
        Some(child)
    }

    fn wait(&mut self, child: Pid) -> i32 {
        self.children.remove(&child).unwrap_or(-1)
    }

    fn exit(&mut self, status: i32) {
        self.exit_status = Some(status);
    }

    fn power_off(&mut self) {
        self.powered_off = true;
    }
}
