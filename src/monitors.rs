use crate::config::Orientation;
use crate::display::DisplaySurface;

/// One display surface, immutable for the lifetime of the process. The `id`
/// is the stable device path used as the join key everywhere else; hot-plug
/// is out of scope.
#[derive(Debug, Clone)]
pub struct Monitor {
    pub id: String,
    pub index: usize,
    pub width: i32,
    pub height: i32,
}

impl Monitor {
    /// Orientation is always derived from geometry so it cannot drift from a
    /// re-queried rect.
    pub fn orientation(&self) -> Orientation {
        Orientation::of_dimensions(self.width.max(0) as u32, self.height.max(0) as u32)
    }
}

/// Enumerates all monitors. No monitors means nothing can ever be assigned,
/// so an unreachable surface or an empty result is fatal.
pub fn enumerate(surface: &impl DisplaySurface) -> Result<Vec<Monitor>, String> {
    let count = surface.monitor_count()?;

    let mut monitors = Vec::with_capacity(count as usize);
    for index in 0..count {
        let id = surface.monitor_id(index)?;
        let rect = surface.monitor_rect(&id)?;
        monitors.push(Monitor {
            id,
            index: index as usize,
            width: rect.width(),
            height: rect.height(),
        });
    }

    if monitors.is_empty() {
        return Err("no monitors found".to_string());
    }

    Ok(monitors)
}
