use mockall::mock;
use remu_core::uma::{DeviceMemory, RegisterBus};

mock! {
    pub Registers {}
    impl RegisterBus for Registers {
        fn read(&mut self, offset: usize) -> u32;
        fn write(&mut self, offset: usize, value: u32);
    }
}

mock! {
    pub Memory {}
    impl DeviceMemory for Memory {
        fn read(&mut self, buf: &mut [u8], offset: u64);
        fn write(&mut self, buf: &[u8], offset: u64);
        fn fill(&mut self, byte: u8, offset: u64, len: u64);
        fn size(&self) -> u64;
        fn dma_base(&self) -> u64;
    }
}
