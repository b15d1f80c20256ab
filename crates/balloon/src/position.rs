/// Plain-float geometry supplied by the host; the controller never reads
/// the DOM or any widget tree itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn left(&self) -> f32 {
        self.x
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn top(&self) -> f32 {
        self.y
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayPosition {
    pub x: f32,
    pub y: f32,
}

const OVERLAY_HEIGHT: f32 = 40.0;
const OVERLAY_MIN_WIDTH: f32 = 200.0;
const VERTICAL_MARGIN: f32 = 8.0;
const EDGE_PADDING: f32 = 8.0;

/// Anchor point for the balloon: above the target when it fits, otherwise
/// below, clamped to the viewport.
pub fn overlay_position(target: Rect, viewport: Rect) -> Option<OverlayPosition> {
    if viewport.width <= 0.0 || viewport.height <= 0.0 {
        return None;
    }

    let prefer_above_y = target.top() - OVERLAY_HEIGHT - VERTICAL_MARGIN;
    let prefer_below_y = target.bottom() + VERTICAL_MARGIN;

    let mut x = target.left();
    let mut y = prefer_above_y;

    let min_x = viewport.left() + EDGE_PADDING;
    let max_x = (viewport.right() - OVERLAY_MIN_WIDTH).max(min_x);
    if x < min_x {
        x = min_x;
    } else if x > max_x {
        x = max_x;
    }

    let min_y = viewport.top() + EDGE_PADDING / 2.0;
    let max_y = (viewport.bottom() - OVERLAY_HEIGHT - EDGE_PADDING / 2.0).max(min_y);
    if y < min_y {
        y = prefer_below_y;
    }
    if y < min_y {
        y = min_y;
    } else if y > max_y {
        y = max_y;
    }

    Some(OverlayPosition { x, y })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIEWPORT: Rect = Rect {
        x: 0.0,
        y: 0.0,
        width: 800.0,
        height: 600.0,
    };

    #[test]
    fn prefers_above_the_target() {
        let target = Rect::new(100.0, 300.0, 4.0, 18.0);
        let position = overlay_position(target, VIEWPORT).unwrap();
        assert_eq!(position.x, 100.0);
        assert!(position.y < target.top());
    }

    #[test]
    fn falls_below_when_no_room_above() {
        let target = Rect::new(100.0, 10.0, 4.0, 18.0);
        let position = overlay_position(target, VIEWPORT).unwrap();
        assert!(position.y > target.bottom());
    }

    #[test]
    fn clamps_to_viewport_edges() {
        let target = Rect::new(790.0, 300.0, 4.0, 18.0);
        let position = overlay_position(target, VIEWPORT).unwrap();
        assert!(position.x <= VIEWPORT.right() - OVERLAY_MIN_WIDTH);
    }

    #[test]
    fn empty_viewport_yields_no_position() {
        let target = Rect::new(0.0, 0.0, 4.0, 18.0);
        assert!(overlay_position(target, Rect::new(0.0, 0.0, 0.0, 0.0)).is_none());
    }
}
