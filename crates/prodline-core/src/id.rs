use slotmap::new_key_type;

new_key_type! {
    /// Identifies a machine in the resolved line topology.
    pub struct MachineId;

    /// Identifies a conveyor in the resolved line topology.
    pub struct ConveyorId;
}
