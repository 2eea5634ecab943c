//! Domain descriptor documents.
//!
//! Descriptors are libvirt-style XML. Patching streams the document through
//! `quick-xml` so everything the orchestrator does not own (comments,
//! unknown elements, attribute order) survives a round trip.

use crate::core::domain::{
    error::DescriptorError,
    model::{storage::StorageEmulation, vm::Vm},
    value_object::ClockOffset,
};
use quick_xml::{
    Reader, Writer,
    events::{BytesEnd, BytesStart, BytesText, Event},
};
use std::{fmt::Display, path::PathBuf};

const CLOCK: &[u8] = b"clock";
const OFFSET: &[u8] = b"offset";

fn malformed(error: impl Display) -> DescriptorError {
    DescriptorError::Malformed(error.to_string())
}

fn write_failed(error: impl Display) -> DescriptorError {
    DescriptorError::Write(error.to_string())
}

fn element_name(start: &BytesStart<'_>) -> Result<String, DescriptorError> {
    std::str::from_utf8(start.name().as_ref())
        .map(str::to_string)
        .map_err(malformed)
}

/// Copies `start`, replacing or appending its `offset` attribute.
fn with_offset(
    start: &BytesStart<'_>,
    offset: ClockOffset,
) -> Result<BytesStart<'static>, DescriptorError> {
    let mut patched = BytesStart::new(element_name(start)?);
    let mut replaced = false;
    for attr in start.attributes() {
        let attr = attr.map_err(malformed)?;
        if attr.key.as_ref() == OFFSET {
            patched.push_attribute(("offset", offset.as_str()));
            replaced = true;
        } else {
            patched.push_attribute(attr);
        }
    }
    if !replaced {
        patched.push_attribute(("offset", offset.as_str()));
    }
    Ok(patched)
}

fn clock_element(offset: ClockOffset) -> BytesStart<'static> {
    BytesStart::new("clock").with_attributes([("offset", offset.as_str())])
}

/// Sets the clock offset of a descriptor.
///
/// Every `<clock>` element directly under the root gets its `offset`
/// attribute replaced. If there is none, an empty `<clock offset=".."/>` is
/// appended as the root's last child.
pub fn set_clock_offset(xml: &str, offset: ClockOffset) -> Result<String, DescriptorError> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 32));
    let mut depth = 0usize;
    let mut seen_root = false;
    let mut clock_written = false;

    loop {
        let event = reader.read_event().map_err(malformed)?;
        match event {
            Event::Start(start) => {
                if depth == 0 {
                    if seen_root {
                        return Err(malformed("multiple root elements"));
                    }
                    seen_root = true;
                }
                if depth == 1 && start.name().as_ref() == CLOCK {
                    writer
                        .write_event(Event::Start(with_offset(&start, offset)?))
                        .map_err(write_failed)?;
                    clock_written = true;
                } else {
                    writer
                        .write_event(Event::Start(start))
                        .map_err(write_failed)?;
                }
                depth += 1;
            }
            Event::Empty(start) if depth == 0 => {
                if seen_root {
                    return Err(malformed("multiple root elements"));
                }
                seen_root = true;
                let root = element_name(&start)?;
                writer
                    .write_event(Event::Start(start))
                    .map_err(write_failed)?;
                writer
                    .write_event(Event::Empty(clock_element(offset)))
                    .map_err(write_failed)?;
                writer
                    .write_event(Event::End(BytesEnd::new(root)))
                    .map_err(write_failed)?;
                clock_written = true;
            }
            Event::Empty(start) if depth == 1 && start.name().as_ref() == CLOCK => {
                writer
                    .write_event(Event::Empty(with_offset(&start, offset)?))
                    .map_err(write_failed)?;
                clock_written = true;
            }
            Event::End(end) => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| malformed("unbalanced end tag"))?;
                if depth == 0 && !clock_written {
                    writer
                        .write_event(Event::Empty(clock_element(offset)))
                        .map_err(write_failed)?;
                    clock_written = true;
                }
                writer.write_event(Event::End(end)).map_err(write_failed)?;
            }
            Event::Eof => break,
            other => writer.write_event(other).map_err(write_failed)?,
        }
    }

    if !seen_root {
        return Err(DescriptorError::MissingRoot);
    }
    if depth != 0 {
        return Err(malformed("unexpected end of document"));
    }

    String::from_utf8(writer.into_inner()).map_err(malformed)
}

/// The parts of a descriptor the orchestrator checks before redefining.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorSummary {
    pub root: String,
    pub name: Option<String>,
    pub clock_offset: Option<String>,
}

/// Parses a whole descriptor and extracts its root, name and clock offset.
///
/// Fails if the document is not well-formed.
pub fn inspect_descriptor(xml: &str) -> Result<DescriptorSummary, DescriptorError> {
    let mut reader = Reader::from_str(xml);
    let mut depth = 0usize;
    let mut root = None;
    let mut name: Option<String> = None;
    let mut in_name = false;
    let mut clock_offset = None;

    let offset_of = |start: &BytesStart<'_>| -> Result<Option<String>, DescriptorError> {
        match start.try_get_attribute("offset").map_err(malformed)? {
            Some(attr) => Ok(Some(attr.unescape_value().map_err(malformed)?.into_owned())),
            None => Ok(None),
        }
    };

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(start) => {
                if depth == 0 {
                    if root.is_some() {
                        return Err(malformed("multiple root elements"));
                    }
                    root = Some(element_name(&start)?);
                } else if depth == 1 {
                    match start.name().as_ref() {
                        b"name" => {
                            in_name = true;
                            name.get_or_insert_with(String::new);
                        }
                        CLOCK => clock_offset = offset_of(&start)?,
                        _ => {}
                    }
                }
                depth += 1;
            }
            Event::Empty(start) => {
                if depth == 0 {
                    if root.is_some() {
                        return Err(malformed("multiple root elements"));
                    }
                    root = Some(element_name(&start)?);
                } else if depth == 1 && start.name().as_ref() == CLOCK {
                    clock_offset = offset_of(&start)?;
                }
            }
            Event::Text(text) if in_name => {
                if let Some(name) = name.as_mut() {
                    name.push_str(&text.unescape().map_err(malformed)?);
                }
            }
            Event::End(_) => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| malformed("unbalanced end tag"))?;
                in_name = false;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth != 0 {
        return Err(malformed("unexpected end of document"));
    }
    let root = root.ok_or(DescriptorError::MissingRoot)?;

    Ok(DescriptorSummary {
        root,
        name: name.map(|n| n.trim().to_string()),
        clock_offset,
    })
}

/// Where a disk's data lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskSource {
    /// A raw image file.
    File(PathBuf),
    /// A block device such as a pool volume.
    Block(PathBuf),
    /// An ISO image attached as a CD-ROM.
    Cdrom(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskSpec {
    pub source: DiskSource,
    pub bus: StorageEmulation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceSpec {
    pub bridge: String,
    pub mac: Option<String>,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct VncGraphics {
    port: u16,
    password: String,
    resolution: String,
}

/// Builds the descriptor for a persisted VM.
#[derive(Debug, Clone)]
pub struct DomainDescriptorBuilder {
    name: String,
    title: String,
    description: String,
    memory_bytes: u64,
    sockets: u32,
    cores: u32,
    threads: u32,
    pins: Vec<u32>,
    offset: ClockOffset,
    vnc: VncGraphics,
    tpm: bool,
    disks: Vec<DiskSpec>,
    interfaces: Vec<InterfaceSpec>,
}

impl DomainDescriptorBuilder {
    /// Starts a descriptor named after the VM id, carrying its topology,
    /// memory, pins, clock, VNC and TPM settings.
    pub fn from_vm(vm: &Vm) -> Self {
        Self {
            name: vm.vm_id.to_string(),
            title: vm.name.clone(),
            description: vm.description.clone(),
            memory_bytes: vm.ram,
            sockets: vm.cpu_sockets,
            cores: vm.cpu_cores,
            threads: vm.cpu_threads,
            pins: vm.cpu_pinning.clone(),
            offset: vm.time_offset,
            vnc: VncGraphics {
                port: vm.vnc_port,
                password: vm.vnc_password.clone(),
                resolution: vm.vnc_resolution.clone(),
            },
            tpm: vm.tpm_emulation,
            disks: Vec::new(),
            interfaces: Vec::new(),
        }
    }

    pub fn disk(mut self, disk: DiskSpec) -> Self {
        self.disks.push(disk);
        self
    }

    pub fn interface(mut self, interface: InterfaceSpec) -> Self {
        self.interfaces.push(interface);
        self
    }

    pub fn build(&self) -> Result<String, DescriptorError> {
        let mut out = XmlOut::new();
        let vcpus = self
            .sockets
            .checked_mul(self.cores)
            .and_then(|n| n.checked_mul(self.threads))
            .ok_or(DescriptorError::VcpuOverflow {
                sockets: self.sockets,
                cores: self.cores,
                threads: self.threads,
            })?;

        out.open("domain", &[("type", "bhyve")])?;
        out.text_element("name", &[], &self.name)?;
        out.text_element("title", &[], &self.title)?;
        if !self.description.is_empty() {
            out.text_element("description", &[], &self.description)?;
        }
        out.text_element("memory", &[("unit", "bytes")], &self.memory_bytes.to_string())?;
        out.text_element("vcpu", &[("placement", "static")], &vcpus.to_string())?;

        if !self.pins.is_empty() {
            out.open("cputune", &[])?;
            for (vcpu, core) in self.pins.iter().enumerate() {
                out.empty(
                    "vcpupin",
                    &[("vcpu", &vcpu.to_string()), ("cpuset", &core.to_string())],
                )?;
            }
            out.close("cputune")?;
        }

        out.open("cpu", &[])?;
        out.empty(
            "topology",
            &[
                ("sockets", &self.sockets.to_string()),
                ("cores", &self.cores.to_string()),
                ("threads", &self.threads.to_string()),
            ],
        )?;
        out.close("cpu")?;

        out.open("os", &[("firmware", "efi")])?;
        out.text_element("type", &[("arch", "x86_64")], "hvm")?;
        out.close("os")?;

        out.open("features", &[])?;
        out.empty("acpi", &[])?;
        out.empty("apic", &[])?;
        out.close("features")?;

        out.empty("clock", &[("offset", self.offset.as_str())])?;
        out.text_element("on_poweroff", &[], "destroy")?;
        out.text_element("on_reboot", &[], "restart")?;
        out.text_element("on_crash", &[], "destroy")?;

        out.open("devices", &[])?;
        self.write_disks(&mut out)?;
        for interface in &self.interfaces {
            out.open("interface", &[("type", "bridge")])?;
            if let Some(mac) = &interface.mac {
                out.empty("mac", &[("address", mac)])?;
            }
            out.empty("source", &[("bridge", &interface.bridge)])?;
            out.empty("model", &[("type", &interface.model)])?;
            out.close("interface")?;
        }
        self.write_graphics(&mut out)?;
        if self.tpm {
            out.open("tpm", &[("model", "tpm-crb")])?;
            out.empty("backend", &[("type", "emulator"), ("version", "2.0")])?;
            out.close("tpm")?;
        }
        out.close("devices")?;
        out.close("domain")?;

        out.finish()
    }

    fn write_disks(&self, out: &mut XmlOut) -> Result<(), DescriptorError> {
        let mut per_bus = [0usize; 3];
        for disk in &self.disks {
            let (bus, slot) = match disk.bus {
                StorageEmulation::VirtioBlk => ("virtio", 0),
                StorageEmulation::AhciHd | StorageEmulation::AhciCd => ("sata", 1),
                StorageEmulation::Nvme => ("nvme", 2),
            };
            let index = per_bus[slot];
            per_bus[slot] += 1;
            let target = match slot {
                0 => format!("vd{}", drive_letter(index)),
                1 => format!("sd{}", drive_letter(index)),
                _ => format!("nvme{index}n1"),
            };

            let (kind, device, source_attr, path) = match &disk.source {
                DiskSource::File(path) => ("file", "disk", "file", path),
                DiskSource::Block(path) => ("block", "disk", "dev", path),
                DiskSource::Cdrom(path) => ("file", "cdrom", "file", path),
            };
            let path = path.to_string_lossy();

            out.open("disk", &[("type", kind), ("device", device)])?;
            out.empty("driver", &[("name", "file"), ("type", "raw")])?;
            out.empty("source", &[(source_attr, &path)])?;
            out.empty("target", &[("dev", &target), ("bus", bus)])?;
            if matches!(disk.source, DiskSource::Cdrom(_)) {
                out.empty("readonly", &[])?;
            }
            out.close("disk")?;
        }
        Ok(())
    }

    fn write_graphics(&self, out: &mut XmlOut) -> Result<(), DescriptorError> {
        let port = self.vnc.port.to_string();
        let mut attrs = vec![
            ("type", "vnc"),
            ("port", port.as_str()),
            ("autoport", "no"),
            ("listen", "0.0.0.0"),
        ];
        if !self.vnc.password.is_empty() {
            attrs.push(("passwd", self.vnc.password.as_str()));
        }
        out.empty("graphics", &attrs)?;

        out.open("video", &[])?;
        match self.vnc.resolution.split_once('x') {
            Some((x, y)) => {
                out.open("model", &[("type", "gop"), ("heads", "1"), ("primary", "yes")])?;
                out.empty("resolution", &[("x", x), ("y", y)])?;
                out.close("model")?;
            }
            None => out.empty("model", &[("type", "gop"), ("heads", "1"), ("primary", "yes")])?,
        }
        out.close("video")
    }
}

fn drive_letter(index: usize) -> char {
    // 26 disks per bus is plenty for the single data disk and ISO we attach
    char::from(b'a' + (index % 26) as u8)
}

struct XmlOut {
    writer: Writer<Vec<u8>>,
}

impl XmlOut {
    fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    fn start<'a>(name: &'a str, attrs: &[(&'a str, &'a str)]) -> BytesStart<'a> {
        BytesStart::new(name).with_attributes(attrs.iter().copied())
    }

    fn open(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), DescriptorError> {
        self.writer
            .write_event(Event::Start(Self::start(name, attrs)))
            .map_err(write_failed)
    }

    fn close(&mut self, name: &str) -> Result<(), DescriptorError> {
        self.writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(write_failed)
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), DescriptorError> {
        self.writer
            .write_event(Event::Empty(Self::start(name, attrs)))
            .map_err(write_failed)
    }

    fn text_element(
        &mut self,
        name: &str,
        attrs: &[(&str, &str)],
        text: &str,
    ) -> Result<(), DescriptorError> {
        self.open(name, attrs)?;
        self.writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(write_failed)?;
        self.close(name)
    }

    fn finish(self) -> Result<String, DescriptorError> {
        String::from_utf8(self.writer.into_inner()).map_err(write_failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::model::vm::VmState;
    use chrono::Utc;

    const DESCRIPTOR: &str = r#"<domain type="bhyve">
  <!-- managed -->
  <name>104</name>
  <clock offset="utc" adjustment="reset"/>
  <devices><disk type="file"/></devices>
</domain>"#;

    fn vm() -> Vm {
        Vm {
            id: 1,
            name: "web".to_string(),
            description: "front & back".to_string(),
            vm_id: 104,
            cpu_sockets: 1,
            cpu_cores: 2,
            cpu_threads: 1,
            ram: 1 << 30,
            vnc_port: 5904,
            vnc_password: String::new(),
            vnc_resolution: "1280x720".to_string(),
            vnc_wait: true,
            start_at_boot: true,
            start_order: 0,
            wol: false,
            tpm_emulation: true,
            time_offset: ClockOffset::Utc,
            iso: String::new(),
            storages: Vec::new(),
            networks: Vec::new(),
            pci_devices: Vec::new(),
            cpu_pinning: vec![6, 7],
            stats: Vec::new(),
            state: VmState::Unknown,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            started_at: None,
            stopped_at: None,
        }
    }

    #[test]
    fn test_replaces_existing_offset() {
        let patched = set_clock_offset(DESCRIPTOR, ClockOffset::Localtime).unwrap();

        assert!(patched.contains(r#"<clock offset="localtime" adjustment="reset"/>"#));
        assert!(patched.contains("<!-- managed -->"));
        assert!(patched.contains(r#"<disk type="file"/>"#));
        assert_eq!(patched.matches("<clock").count(), 1);
    }

    #[test]
    fn test_inserts_missing_clock() {
        let xml = "<domain><name>9</name><devices/></domain>";
        let patched = set_clock_offset(xml, ClockOffset::Localtime).unwrap();
        assert_eq!(
            patched,
            r#"<domain><name>9</name><devices/><clock offset="localtime"/></domain>"#
        );
    }

    #[test]
    fn test_nested_clock_is_not_touched() {
        let xml = r#"<domain><metadata><clock offset="x"/></metadata></domain>"#;
        let patched = set_clock_offset(xml, ClockOffset::Utc).unwrap();
        assert!(patched.contains(r#"<metadata><clock offset="x"/></metadata>"#));
        assert!(patched.ends_with(r#"<clock offset="utc"/></domain>"#));
    }

    #[test]
    fn test_empty_root_gets_children() {
        let patched = set_clock_offset("<domain/>", ClockOffset::Utc).unwrap();
        assert_eq!(patched, r#"<domain><clock offset="utc"/></domain>"#);
    }

    #[test]
    fn test_rejects_malformed_documents() {
        assert!(matches!(
            set_clock_offset("<domain><name>1</domain>", ClockOffset::Utc),
            Err(DescriptorError::Malformed(_))
        ));
        assert!(matches!(
            set_clock_offset("<domain>", ClockOffset::Utc),
            Err(DescriptorError::Malformed(_))
        ));
        assert!(matches!(
            set_clock_offset("", ClockOffset::Utc),
            Err(DescriptorError::MissingRoot)
        ));
    }

    #[test]
    fn test_inspect_descriptor() {
        let summary = inspect_descriptor(DESCRIPTOR).unwrap();
        assert_eq!(summary.root, "domain");
        assert_eq!(summary.name.as_deref(), Some("104"));
        assert_eq!(summary.clock_offset.as_deref(), Some("utc"));

        let bare = inspect_descriptor("<domain/>").unwrap();
        assert_eq!(bare.name, None);
        assert_eq!(bare.clock_offset, None);
    }

    #[test]
    fn test_builder_rejects_overflowing_topology() {
        let mut vm = vm();
        vm.cpu_sockets = 65536;
        vm.cpu_cores = 65536;
        assert!(matches!(
            DomainDescriptorBuilder::from_vm(&vm).build(),
            Err(DescriptorError::VcpuOverflow {
                sockets: 65536,
                cores: 65536,
                threads: 1
            })
        ));
    }

    #[test]
    fn test_builder_output_round_trips() {
        let xml = DomainDescriptorBuilder::from_vm(&vm())
            .disk(DiskSpec {
                source: DiskSource::File(PathBuf::from("/pool/vms/104.img")),
                bus: StorageEmulation::VirtioBlk,
            })
            .disk(DiskSpec {
                source: DiskSource::Cdrom(PathBuf::from("/downloads/os.iso")),
                bus: StorageEmulation::AhciCd,
            })
            .interface(InterfaceSpec {
                bridge: "bridge0".to_string(),
                mac: Some("02:00:00:aa:bb:cc".to_string()),
                model: "virtio".to_string(),
            })
            .build()
            .unwrap();

        let summary = inspect_descriptor(&xml).unwrap();
        assert_eq!(summary.root, "domain");
        assert_eq!(summary.name.as_deref(), Some("104"));
        assert_eq!(summary.clock_offset.as_deref(), Some("utc"));

        assert!(xml.contains("<title>web</title>"));
        assert!(xml.contains("front &amp; back"));
        assert!(xml.contains(r#"<vcpu placement="static">2</vcpu>"#));
        assert!(xml.contains(r#"<vcpupin vcpu="1" cpuset="7"/>"#));
        assert!(xml.contains(r#"<source file="/pool/vms/104.img"/>"#));
        assert!(xml.contains(r#"<target dev="vda" bus="virtio"/>"#));
        assert!(xml.contains(r#"<target dev="sda" bus="sata"/>"#));
        assert!(xml.contains(r#"<mac address="02:00:00:aa:bb:cc"/>"#));
        assert!(xml.contains(r#"<source bridge="bridge0"/>"#));
        assert!(xml.contains(r#"<resolution x="1280" y="720"/>"#));
        assert!(xml.contains(r#"<tpm model="tpm-crb">"#));
        assert!(!xml.contains("passwd"));

        let patched = set_clock_offset(&xml, ClockOffset::Localtime).unwrap();
        let summary = inspect_descriptor(&patched).unwrap();
        assert_eq!(summary.clock_offset.as_deref(), Some("localtime"));
    }
}
