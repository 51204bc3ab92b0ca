use craftbox_image::ImageAlias;

pub const DEFAULT_CPUS: u32 = 2;
pub const DEFAULT_MEM_GB: u32 = 2;
pub const DEFAULT_DISK_GB: u32 = 256;

/// Immutable launch parameters, consumed once at launch time. The name is
/// globally unique within a backend's namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceConfig {
    pub name: String,
    pub image: ImageAlias,
    pub cpus: u32,
    pub mem_gb: u32,
    pub disk_gb: u32,
}

impl InstanceConfig {
    pub fn new(name: impl Into<String>, image: ImageAlias) -> Self {
        Self {
            name: name.into(),
            image,
            cpus: DEFAULT_CPUS,
            mem_gb: DEFAULT_MEM_GB,
            disk_gb: DEFAULT_DISK_GB,
        }
    }

    pub fn with_cpus(mut self, cpus: u32) -> Self {
        self.cpus = cpus;
        self
    }

    pub fn with_mem_gb(mut self, mem_gb: u32) -> Self {
        self.mem_gb = mem_gb;
        self
    }

    pub fn with_disk_gb(mut self, disk_gb: u32) -> Self {
        self.disk_gb = disk_gb;
        self
    }
}
