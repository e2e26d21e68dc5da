// Order controller declared through doc comment directives.
// Parsed by the comment extraction tests; never compiled.

use keystone_core::ContextHandle;

/// Order endpoints.
///
/// @RestController
/// @RequestMapping("/orders")
/// @Tag(name="team", value="billing")
#[derive(Default)]
pub struct OrderController;

impl OrderController {
    /// Look up one order.
    ///
    /// @GetMapping("/{id}")
    /// @PathVariable("id")
    pub fn show(&mut self, id: u64, ctx: ContextHandle) -> String {
        format!("order {} via {}", id, ctx.path())
    }

    /// Place an order.
    ///
    /// @PostMapping
    /// @RequestBody
    pub fn create(&mut self, order: NewOrder) -> NewOrder {
        order
    }

    /// @GetMapping("/search")
    /// @RequestParam(name="q")
    /// @RequestParam(name="limit", defaultValue="10")
    /// @Description("Search orders by text")
    pub fn search(&mut self, q: String, limit: u32) -> Vec<String> {
        vec![q; limit as usize]
    }

    fn audit(&self) {}
}
